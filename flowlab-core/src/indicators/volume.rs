//! Volume-weighted measures. OBV accumulates from the axis start; the
//! windowed measures follow the usual NaN-sentinel rules.

use super::moving::sma;

/// Rolling average of share volume.
pub fn volume_sma(volumes: &[f64], period: usize) -> Vec<f64> {
    sma(volumes, period)
}

/// On-balance volume. Starts at 0 on the first finite close and adds or
/// subtracts each day's volume by close direction. A gap after the start
/// taints the remainder.
pub fn obv(close: &[f64], volumes: &[f64]) -> Vec<f64> {
    let n = close.len();
    let mut out = vec![f64::NAN; n];
    if volumes.len() != n {
        return out;
    }
    let mut acc: Option<f64> = None;
    let mut prev_close = f64::NAN;
    for i in 0..n {
        let (c, v) = (close[i], volumes[i]);
        match acc {
            None => {
                if !c.is_nan() && !v.is_nan() {
                    acc = Some(0.0);
                    out[i] = 0.0;
                    prev_close = c;
                }
            }
            Some(total) => {
                if c.is_nan() || v.is_nan() {
                    break;
                }
                let next = if c > prev_close {
                    total + v
                } else if c < prev_close {
                    total - v
                } else {
                    total
                };
                out[i] = next;
                acc = Some(next);
                prev_close = c;
            }
        }
    }
    out
}

/// Rolling volume-weighted average of the typical price (h+l+c)/3.
pub fn vwap(high: &[f64], low: &[f64], close: &[f64], volumes: &[f64], period: usize) -> Vec<f64> {
    let n = close.len();
    let mut out = vec![f64::NAN; n];
    if period == 0 || n < period || high.len() != n || low.len() != n || volumes.len() != n {
        return out;
    }
    for i in (period - 1)..n {
        let mut pv = 0.0;
        let mut v_sum = 0.0;
        let mut bad = false;
        for j in i + 1 - period..=i {
            let tp = (high[j] + low[j] + close[j]) / 3.0;
            if tp.is_nan() || volumes[j].is_nan() {
                bad = true;
                break;
            }
            pv += tp * volumes[j];
            v_sum += volumes[j];
        }
        if !bad && v_sum > 0.0 {
            out[i] = pv / v_sum;
        }
    }
    out
}

/// Money flow index, 0..100. Zero flow both ways resolves to 50.
pub fn mfi(high: &[f64], low: &[f64], close: &[f64], volumes: &[f64], period: usize) -> Vec<f64> {
    let n = close.len();
    let mut out = vec![f64::NAN; n];
    if period == 0 || n <= period || high.len() != n || low.len() != n || volumes.len() != n {
        return out;
    }
    let tp: Vec<f64> = (0..n).map(|i| (high[i] + low[i] + close[i]) / 3.0).collect();
    for i in period..n {
        let mut pos = 0.0;
        let mut neg = 0.0;
        let mut bad = false;
        for j in i + 1 - period..=i {
            let (now, prev, v) = (tp[j], tp[j - 1], volumes[j]);
            if now.is_nan() || prev.is_nan() || v.is_nan() {
                bad = true;
                break;
            }
            let flow = now * v;
            if now > prev {
                pos += flow;
            } else if now < prev {
                neg += flow;
            }
        }
        if bad {
            continue;
        }
        out[i] = if pos + neg > f64::EPSILON {
            100.0 * pos / (pos + neg)
        } else {
            50.0
        };
    }
    out
}

/// Chaikin money flow, -1..1. A zero-range bar contributes no flow.
pub fn chaikin_money_flow(
    high: &[f64],
    low: &[f64],
    close: &[f64],
    volumes: &[f64],
    period: usize,
) -> Vec<f64> {
    let n = close.len();
    let mut out = vec![f64::NAN; n];
    if period == 0 || n < period || high.len() != n || low.len() != n || volumes.len() != n {
        return out;
    }
    for i in (period - 1)..n {
        let mut mfv = 0.0;
        let mut v_sum = 0.0;
        let mut bad = false;
        for j in i + 1 - period..=i {
            let (h, l, c, v) = (high[j], low[j], close[j], volumes[j]);
            if h.is_nan() || l.is_nan() || c.is_nan() || v.is_nan() {
                bad = true;
                break;
            }
            let range = h - l;
            let mult = if range > f64::EPSILON {
                ((c - l) - (h - c)) / range
            } else {
                0.0
            };
            mfv += mult * v;
            v_sum += v;
        }
        if !bad && v_sum > 0.0 {
            out[i] = mfv / v_sum;
        }
    }
    out
}
