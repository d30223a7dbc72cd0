//! Trend strength: least-squares regression over a window, Wilder's
//! directional system (ADX), and Aroon.

use super::moving::wilder;
use super::volatility::true_range;

/// Value of the fitted regression line at the window's last day.
pub fn linreg_value(values: &[f64], period: usize) -> Vec<f64> {
    regression(values, period, |slope, intercept, _| {
        intercept + slope * (period as f64 - 1.0)
    })
}

/// Slope of the fitted line, in price units per day.
pub fn linreg_slope(values: &[f64], period: usize) -> Vec<f64> {
    regression(values, period, |slope, _, _| slope)
}

/// Intercept of the fitted line (fit value at the window's first day).
pub fn linreg_intercept(values: &[f64], period: usize) -> Vec<f64> {
    regression(values, period, |_, intercept, _| intercept)
}

/// Coefficient of determination of the fit. A flat window resolves to 0.
pub fn r_squared(values: &[f64], period: usize) -> Vec<f64> {
    regression(values, period, |_, _, r2| r2)
}

/// Average directional index. First defined at index 2*period - 1.
/// A zero directional sum resolves DX to 0 for that day.
pub fn adx(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<f64> {
    let n = close.len();
    if period == 0 || high.len() != n || low.len() != n {
        return vec![f64::NAN; n];
    }
    let mut plus_dm = vec![f64::NAN; n];
    let mut minus_dm = vec![f64::NAN; n];
    for i in 1..n {
        let up = high[i] - high[i - 1];
        let down = low[i - 1] - low[i];
        if up.is_nan() || down.is_nan() {
            continue;
        }
        plus_dm[i] = if up > down && up > 0.0 { up } else { 0.0 };
        minus_dm[i] = if down > up && down > 0.0 { down } else { 0.0 };
    }

    let tr_s = wilder(&true_range(high, low, close), period);
    let plus_s = wilder(&plus_dm, period);
    let minus_s = wilder(&minus_dm, period);

    let dx: Vec<f64> = (0..n)
        .map(|i| {
            let (t, p, m) = (tr_s[i], plus_s[i], minus_s[i]);
            if t.is_nan() || p.is_nan() || m.is_nan() || t <= 0.0 {
                return f64::NAN;
            }
            let plus_di = 100.0 * p / t;
            let minus_di = 100.0 * m / t;
            let sum = plus_di + minus_di;
            if sum > f64::EPSILON {
                100.0 * (plus_di - minus_di).abs() / sum
            } else {
                0.0
            }
        })
        .collect();
    wilder(&dx, period)
}

/// Days since the highest high, scaled so a fresh high reads 100.
pub fn aroon_up(high: &[f64], period: usize) -> Vec<f64> {
    aroon_side(high, period, true)
}

/// Days since the lowest low, scaled so a fresh low reads 100.
pub fn aroon_down(low: &[f64], period: usize) -> Vec<f64> {
    aroon_side(low, period, false)
}

/// AroonUp - AroonDown, -100..100.
pub fn aroon_oscillator(high: &[f64], low: &[f64], period: usize) -> Vec<f64> {
    aroon_up(high, period)
        .iter()
        .zip(aroon_down(low, period))
        .map(|(u, d)| u - d)
        .collect()
}

/// Aroon scans `period + 1` bars: today plus the lookback.
fn aroon_side(values: &[f64], period: usize, seek_max: bool) -> Vec<f64> {
    let n = values.len();
    let mut out = vec![f64::NAN; n];
    if period == 0 || n <= period {
        return out;
    }
    for i in period..n {
        let window = &values[i - period..=i];
        if window.iter().any(|v| v.is_nan()) {
            continue;
        }
        let mut best_idx = 0usize;
        for (k, &v) in window.iter().enumerate() {
            let better = if seek_max {
                v >= window[best_idx]
            } else {
                v <= window[best_idx]
            };
            if better {
                best_idx = k;
            }
        }
        let days_since = period - best_idx;
        out[i] = 100.0 * (period - days_since) as f64 / period as f64;
    }
    out
}

fn regression(
    values: &[f64],
    period: usize,
    pick: impl Fn(f64, f64, f64) -> f64,
) -> Vec<f64> {
    let n = values.len();
    let mut out = vec![f64::NAN; n];
    if period < 2 || n < period {
        return out;
    }
    // x = 0..period-1; these moments only depend on the window length.
    let p = period as f64;
    let mean_x = (p - 1.0) / 2.0;
    let var_x = (p * p - 1.0) / 12.0;

    for i in (period - 1)..n {
        let window = &values[i + 1 - period..=i];
        if window.iter().any(|v| v.is_nan()) {
            continue;
        }
        let mean_y = window.iter().sum::<f64>() / p;
        let mut cov = 0.0;
        let mut var_y = 0.0;
        for (k, &y) in window.iter().enumerate() {
            let dx = k as f64 - mean_x;
            let dy = y - mean_y;
            cov += dx * dy;
            var_y += dy * dy;
        }
        cov /= p;
        var_y /= p;
        let slope = cov / var_x;
        let intercept = mean_y - slope * mean_x;
        let r2 = if var_y > f64::EPSILON {
            (cov * cov) / (var_x * var_y)
        } else {
            0.0
        };
        out[i] = pick(slope, intercept, r2);
    }
    out
}
