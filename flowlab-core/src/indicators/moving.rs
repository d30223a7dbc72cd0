//! Moving-average family: windowed and recursive smoothers.
//!
//! Every function returns a full-length series with NaN before the first
//! defined value. Recursive smoothers (EMA, Wilder, KAMA) seed at the
//! first run of `period` consecutive finite inputs, so series that begin
//! with NaN sentinels (short-history symbols on a longer axis) still
//! warm up; a NaN arriving after the seed taints the remainder.

/// Rolling mean over `period` values. NaN in the window yields NaN.
pub fn sma(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut out = vec![f64::NAN; n];
    if period == 0 || n < period {
        return out;
    }
    for i in (period - 1)..n {
        let window = &values[i + 1 - period..=i];
        if window.iter().any(|v| v.is_nan()) {
            continue;
        }
        out[i] = window.iter().sum::<f64>() / period as f64;
    }
    out
}

/// Linearly weighted mean: newest value carries weight `period`.
pub fn wma(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut out = vec![f64::NAN; n];
    if period == 0 || n < period {
        return out;
    }
    let denom = (period * (period + 1)) as f64 / 2.0;
    for i in (period - 1)..n {
        let window = &values[i + 1 - period..=i];
        if window.iter().any(|v| v.is_nan()) {
            continue;
        }
        let num: f64 = window
            .iter()
            .enumerate()
            .map(|(k, v)| (k + 1) as f64 * v)
            .sum();
        out[i] = num / denom;
    }
    out
}

/// Exponential moving average, alpha = 2 / (period + 1), seeded with the
/// SMA of the first full window.
pub fn ema(values: &[f64], period: usize) -> Vec<f64> {
    recursive_smooth(values, period, 2.0 / (period as f64 + 1.0))
}

/// Wilder smoothing, alpha = 1 / period. Shared by RSI, ATR, and ADX.
pub fn wilder(values: &[f64], period: usize) -> Vec<f64> {
    recursive_smooth(values, period, 1.0 / period as f64)
}

/// Double EMA: 2*EMA - EMA(EMA).
pub fn dema(values: &[f64], period: usize) -> Vec<f64> {
    let e1 = ema(values, period);
    let e2 = ema(&e1, period);
    combine2(&e1, &e2, |a, b| 2.0 * a - b)
}

/// Triple EMA: 3*EMA - 3*EMA(EMA) + EMA(EMA(EMA)).
pub fn tema(values: &[f64], period: usize) -> Vec<f64> {
    let e1 = ema(values, period);
    let e2 = ema(&e1, period);
    let e3 = ema(&e2, period);
    e1.iter()
        .zip(&e2)
        .zip(&e3)
        .map(|((a, b), c)| 3.0 * a - 3.0 * b + c)
        .collect()
}

/// Triangular MA: SMA of SMA with split windows n1 = ceil((p+1)/2),
/// n2 = floor(p/2) + 1.
pub fn trima(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 {
        return vec![f64::NAN; values.len()];
    }
    let n1 = (period + 1) / 2;
    let n2 = period / 2 + 1;
    sma(&sma(values, n1), n2)
}

/// Kaufman adaptive MA with the standard fast=2 / slow=30 bounds.
/// Seeds with the raw value at the first index with a full change window.
pub fn kama(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut out = vec![f64::NAN; n];
    if period == 0 || n <= period {
        return out;
    }
    let fast_sc = 2.0 / 3.0;
    let slow_sc = 2.0 / 31.0;

    let mut prev: Option<f64> = None;
    for i in period..n {
        let window = &values[i - period..=i];
        if window.iter().any(|v| v.is_nan()) {
            if prev.is_some() {
                // Tainted after seeding.
                break;
            }
            continue;
        }
        let current = match prev {
            None => values[i],
            Some(p) => {
                let direction = (values[i] - values[i - period]).abs();
                let volatility: f64 = window.windows(2).map(|w| (w[1] - w[0]).abs()).sum();
                let er = if volatility > f64::EPSILON {
                    direction / volatility
                } else {
                    0.0
                };
                let sc = (er * (fast_sc - slow_sc) + slow_sc).powi(2);
                p + sc * (values[i] - p)
            }
        };
        out[i] = current;
        prev = Some(current);
    }
    out
}

/// Hull MA: WMA(2*WMA(p/2) - WMA(p), round(sqrt(p))).
pub fn hma(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 {
        return vec![f64::NAN; values.len()];
    }
    let half = (period / 2).max(1);
    let sqrt_p = ((period as f64).sqrt().round() as usize).max(1);
    let fast = wma(values, half);
    let slow = wma(values, period);
    let diff = combine2(&fast, &slow, |a, b| 2.0 * a - b);
    wma(&diff, sqrt_p)
}

/// Volume-weighted MA over the window.
pub fn vwma(values: &[f64], volumes: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut out = vec![f64::NAN; n];
    if period == 0 || n < period || volumes.len() != n {
        return out;
    }
    for i in (period - 1)..n {
        let lo = i + 1 - period;
        let mut pv = 0.0;
        let mut v_sum = 0.0;
        let mut bad = false;
        for j in lo..=i {
            if values[j].is_nan() || volumes[j].is_nan() {
                bad = true;
                break;
            }
            pv += values[j] * volumes[j];
            v_sum += volumes[j];
        }
        if !bad && v_sum > 0.0 {
            out[i] = pv / v_sum;
        }
    }
    out
}

/// Seeded recursive smoother shared by EMA and Wilder variants.
/// Seed: mean of the first `period` consecutive finite values.
fn recursive_smooth(values: &[f64], period: usize, alpha: f64) -> Vec<f64> {
    let n = values.len();
    let mut out = vec![f64::NAN; n];
    if period == 0 || n < period {
        return out;
    }

    let Some(seed_start) = seed_start(values, period) else {
        return out;
    };
    let seed_end = seed_start + period;
    let seed = values[seed_start..seed_end].iter().sum::<f64>() / period as f64;
    out[seed_end - 1] = seed;

    let mut prev = seed;
    for i in seed_end..n {
        if values[i].is_nan() {
            break;
        }
        let next = alpha * values[i] + (1.0 - alpha) * prev;
        out[i] = next;
        prev = next;
    }
    out
}

/// First index where `period` consecutive finite values begin.
fn seed_start(values: &[f64], period: usize) -> Option<usize> {
    let mut run = 0usize;
    for (i, v) in values.iter().enumerate() {
        if v.is_nan() {
            run = 0;
        } else {
            run += 1;
            if run == period {
                return Some(i + 1 - period);
            }
        }
    }
    None
}

fn combine2(a: &[f64], b: &[f64], f: impl Fn(f64, f64) -> f64) -> Vec<f64> {
    a.iter().zip(b).map(|(x, y)| f(*x, *y)).collect()
}
