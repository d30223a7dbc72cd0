//! Volatility and drawdown measures.
//!
//! Return-based measures need `period + 1` price points (one extra for
//! the first daily return). Drawdown measures report positive percent
//! magnitudes so threshold conditions read naturally.

use super::moving::wilder;
use crate::metrics::TRADING_DAYS_PER_YEAR;

/// Sample standard deviation (n-1) of prices over the window.
pub fn stddev(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut out = vec![f64::NAN; n];
    if period < 2 || n < period {
        return out;
    }
    for i in (period - 1)..n {
        let window = &values[i + 1 - period..=i];
        if window.iter().any(|v| v.is_nan()) {
            continue;
        }
        out[i] = sample_stddev(window);
    }
    out
}

/// Sample standard deviation of daily returns over the window.
pub fn stddev_returns(values: &[f64], period: usize) -> Vec<f64> {
    stddev(&daily_returns(values), period)
}

/// Return volatility scaled to an annual figure by sqrt(252).
pub fn annualized_volatility(values: &[f64], period: usize) -> Vec<f64> {
    let scale = TRADING_DAYS_PER_YEAR.sqrt();
    stddev_returns(values, period)
        .into_iter()
        .map(|v| v * scale)
        .collect()
}

/// True range. Index 0 has no prior close and stays NaN.
pub fn true_range(high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
    let n = close.len();
    let mut out = vec![f64::NAN; n];
    if high.len() != n || low.len() != n {
        return out;
    }
    for i in 1..n {
        let (h, l, pc) = (high[i], low[i], close[i - 1]);
        if h.is_nan() || l.is_nan() || pc.is_nan() {
            continue;
        }
        out[i] = (h - l).max((h - pc).abs()).max((l - pc).abs());
    }
    out
}

/// Average true range, Wilder-smoothed.
pub fn atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<f64> {
    wilder(&true_range(high, low, close), period)
}

/// ATR as a percent of the close, comparable across price levels.
pub fn normalized_atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<f64> {
    atr(high, low, close, period)
        .iter()
        .zip(close)
        .map(|(&a, &c)| {
            if a.is_nan() || c.is_nan() || c <= 0.0 {
                f64::NAN
            } else {
                a / c * 100.0
            }
        })
        .collect()
}

/// Deepest peak-to-trough decline within the window, positive percent.
pub fn max_drawdown_over(values: &[f64], period: usize) -> Vec<f64> {
    window_scan(values, period, |window| {
        let mut peak = f64::MIN;
        let mut worst = 0.0f64;
        for &v in window {
            peak = peak.max(v);
            if peak > 0.0 {
                worst = worst.max((peak - v) / peak * 100.0);
            }
        }
        worst
    })
}

/// Current decline from the highest value in the window, positive percent.
pub fn drawdown_from_high(values: &[f64], period: usize) -> Vec<f64> {
    window_scan(values, period, |window| {
        let peak = window.iter().cloned().fold(f64::MIN, f64::max);
        let last = *window.last().unwrap();
        if peak > 0.0 {
            (peak - last) / peak * 100.0
        } else {
            f64::NAN
        }
    })
}

/// Ulcer index: RMS of percent drawdowns from the running in-window high.
pub fn ulcer_index(values: &[f64], period: usize) -> Vec<f64> {
    window_scan(values, period, |window| {
        let mut peak = f64::MIN;
        let mut sum_sq = 0.0;
        for &v in window {
            peak = peak.max(v);
            if peak > 0.0 {
                let dd = (peak - v) / peak * 100.0;
                sum_sq += dd * dd;
            }
        }
        (sum_sq / window.len() as f64).sqrt()
    })
}

/// v[i] / v[i-1] - 1 with NaN where either side is missing or the base
/// is non-positive.
pub fn daily_returns(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    let mut out = vec![f64::NAN; n];
    for i in 1..n {
        let (now, prev) = (values[i], values[i - 1]);
        if now.is_nan() || prev.is_nan() || prev <= 0.0 {
            continue;
        }
        out[i] = now / prev - 1.0;
    }
    out
}

fn sample_stddev(window: &[f64]) -> f64 {
    let n = window.len() as f64;
    let mean = window.iter().sum::<f64>() / n;
    let var = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    var.sqrt()
}

fn window_scan(values: &[f64], period: usize, f: impl Fn(&[f64]) -> f64) -> Vec<f64> {
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
        out[i] = f(window);
    }
    out
}
