//! Oscillators and momentum measures.
//!
//! Bounded oscillators resolve their degenerate cases to the midpoint
//! (RSI 50, %K 50, Williams -50) instead of dividing by zero, and CCI
//! resolves a zero mean deviation to 0. Everything else follows the
//! NaN-sentinel convention from the moving-average module.

use super::moving::{ema, sma, wilder};

/// Wilder RSI. Both averages zero resolves to 50; no losses to 100;
/// no gains to 0.
pub fn rsi(values: &[f64], period: usize) -> Vec<f64> {
    let (gains, losses) = gain_loss(values);
    let avg_gain = wilder(&gains, period);
    let avg_loss = wilder(&losses, period);
    rsi_from_averages(&avg_gain, &avg_loss)
}

/// Cutler's RSI: simple moving averages of gains and losses.
pub fn cutler_rsi(values: &[f64], period: usize) -> Vec<f64> {
    let (gains, losses) = gain_loss(values);
    let avg_gain = sma(&gains, period);
    let avg_loss = sma(&losses, period);
    rsi_from_averages(&avg_gain, &avg_loss)
}

/// Stochastic of the RSI: position of RSI within its own rolling range,
/// scaled to 0..100. A flat RSI range resolves to 50.
pub fn stoch_rsi(values: &[f64], period: usize) -> Vec<f64> {
    let r = rsi(values, period);
    let n = r.len();
    let mut out = vec![f64::NAN; n];
    if period == 0 || n < period {
        return out;
    }
    for i in (period - 1)..n {
        let window = &r[i + 1 - period..=i];
        if window.iter().any(|v| v.is_nan()) {
            continue;
        }
        let hi = window.iter().cloned().fold(f64::MIN, f64::max);
        let lo = window.iter().cloned().fold(f64::MAX, f64::min);
        out[i] = if hi - lo > f64::EPSILON {
            (r[i] - lo) / (hi - lo) * 100.0
        } else {
            50.0
        };
    }
    out
}

/// Absolute change over the window: v[i] - v[i-period].
pub fn momentum(values: &[f64], period: usize) -> Vec<f64> {
    change_over(values, period, |now, then| now - then)
}

/// Percentage change over the window, scaled to percent.
pub fn rate_of_change(values: &[f64], period: usize) -> Vec<f64> {
    change_over(values, period, |now, then| {
        if then.abs() > f64::EPSILON {
            (now / then - 1.0) * 100.0
        } else {
            f64::NAN
        }
    })
}

/// Fractional return over the window (RateOfChange / 100).
pub fn cumulative_return(values: &[f64], period: usize) -> Vec<f64> {
    change_over(values, period, |now, then| {
        if then.abs() > f64::EPSILON {
            now / then - 1.0
        } else {
            f64::NAN
        }
    })
}

/// MACD line with the standard 12/26 EMA pair.
pub fn macd_line(values: &[f64]) -> Vec<f64> {
    let fast = ema(values, 12);
    let slow = ema(values, 26);
    fast.iter().zip(&slow).map(|(f, s)| f - s).collect()
}

/// 9-day EMA of the MACD line.
pub fn macd_signal(values: &[f64]) -> Vec<f64> {
    ema(&macd_line(values), 9)
}

/// MACD line minus its signal.
pub fn macd_histogram(values: &[f64]) -> Vec<f64> {
    let line = macd_line(values);
    let signal = ema(&line, 9);
    line.iter().zip(&signal).map(|(l, s)| l - s).collect()
}

/// Fast stochastic %K: close position within the high/low range of the
/// window, 0..100. A flat range resolves to 50.
pub fn stochastic_k(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<f64> {
    range_position(high, low, close, period, |c, hh, ll| {
        if hh - ll > f64::EPSILON {
            (c - ll) / (hh - ll) * 100.0
        } else {
            50.0
        }
    })
}

/// Slow stochastic %D: 3-day SMA of %K.
pub fn stochastic_d(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<f64> {
    sma(&stochastic_k(high, low, close, period), 3)
}

/// Williams %R, -100..0. A flat range resolves to -50.
pub fn williams_r(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<f64> {
    range_position(high, low, close, period, |c, hh, ll| {
        if hh - ll > f64::EPSILON {
            -100.0 * (hh - c) / (hh - ll)
        } else {
            -50.0
        }
    })
}

/// Commodity channel index with the conventional 0.015 scale constant.
/// Zero mean deviation resolves to 0.
pub fn cci(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<f64> {
    let n = close.len();
    let mut out = vec![f64::NAN; n];
    if period == 0 || n < period || high.len() != n || low.len() != n {
        return out;
    }
    let tp: Vec<f64> = (0..n).map(|i| (high[i] + low[i] + close[i]) / 3.0).collect();
    let tp_sma = sma(&tp, period);
    for i in (period - 1)..n {
        if tp_sma[i].is_nan() {
            continue;
        }
        let window = &tp[i + 1 - period..=i];
        let mean_dev =
            window.iter().map(|v| (v - tp_sma[i]).abs()).sum::<f64>() / period as f64;
        out[i] = if mean_dev > f64::EPSILON {
            (tp[i] - tp_sma[i]) / (0.015 * mean_dev)
        } else {
            0.0
        };
    }
    out
}

fn gain_loss(values: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let n = values.len();
    let mut gains = vec![f64::NAN; n];
    let mut losses = vec![f64::NAN; n];
    for i in 1..n {
        let delta = values[i] - values[i - 1];
        if delta.is_nan() {
            continue;
        }
        gains[i] = delta.max(0.0);
        losses[i] = (-delta).max(0.0);
    }
    (gains, losses)
}

fn rsi_from_averages(avg_gain: &[f64], avg_loss: &[f64]) -> Vec<f64> {
    avg_gain
        .iter()
        .zip(avg_loss)
        .map(|(&g, &l)| {
            if g.is_nan() || l.is_nan() {
                f64::NAN
            } else if g + l > f64::EPSILON {
                100.0 * g / (g + l)
            } else {
                50.0
            }
        })
        .collect()
}

fn change_over(values: &[f64], period: usize, f: impl Fn(f64, f64) -> f64) -> Vec<f64> {
    let n = values.len();
    let mut out = vec![f64::NAN; n];
    if period == 0 {
        return out;
    }
    for i in period..n {
        let (now, then) = (values[i], values[i - period]);
        if now.is_nan() || then.is_nan() {
            continue;
        }
        out[i] = f(now, then);
    }
    out
}

fn range_position(
    high: &[f64],
    low: &[f64],
    close: &[f64],
    period: usize,
    f: impl Fn(f64, f64, f64) -> f64,
) -> Vec<f64> {
    let n = close.len();
    let mut out = vec![f64::NAN; n];
    if period == 0 || n < period || high.len() != n || low.len() != n {
        return out;
    }
    for i in (period - 1)..n {
        let lo_idx = i + 1 - period;
        let mut hh = f64::MIN;
        let mut ll = f64::MAX;
        let mut bad = close[i].is_nan();
        for j in lo_idx..=i {
            if high[j].is_nan() || low[j].is_nan() {
                bad = true;
                break;
            }
            hh = hh.max(high[j]);
            ll = ll.min(low[j]);
        }
        if !bad {
            out[i] = f(close[i], hh, ll);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, DEFAULT_EPSILON};

    #[test]
    fn rsi_2_hand_computed() {
        // deltas: [_, +1, +1, -1]; wilder(2) gains seed at 2 = 1.0,
        // losses seed = 0.0 -> RSI 100. Next: gain 0.5, loss 0.5 -> 50.
        let v = [1.0, 2.0, 3.0, 2.0];
        let out = rsi(&v, 2);
        assert!(out[1].is_nan());
        assert_approx(out[2], 100.0, DEFAULT_EPSILON);
        assert_approx(out[3], 50.0, DEFAULT_EPSILON);
    }

    #[test]
    fn rsi_flat_series_is_50() {
        let v = [5.0; 10];
        let out = rsi(&v, 3);
        assert_approx(out[9], 50.0, DEFAULT_EPSILON);
    }

    #[test]
    fn rsi_monotone_decline_is_0() {
        let v = [10.0, 9.0, 8.0, 7.0, 6.0];
        let out = rsi(&v, 3);
        assert_approx(out[4], 0.0, DEFAULT_EPSILON);
    }

    #[test]
    fn cutler_uses_simple_averages() {
        // gains [_,1,1,0], losses [_,0,0,1]; SMA(2) at 3: g=0.5, l=0.5.
        let v = [1.0, 2.0, 3.0, 2.0];
        let out = cutler_rsi(&v, 2);
        assert_approx(out[2], 100.0, DEFAULT_EPSILON);
        assert_approx(out[3], 50.0, DEFAULT_EPSILON);
    }

    #[test]
    fn stoch_rsi_flat_is_50() {
        let v = [5.0; 12];
        let out = stoch_rsi(&v, 3);
        assert_approx(out[11], 50.0, DEFAULT_EPSILON);
    }

    #[test]
    fn momentum_and_roc() {
        let v = [100.0, 101.0, 102.0, 110.0];
        let m = momentum(&v, 3);
        assert!(m[2].is_nan());
        assert_approx(m[3], 10.0, DEFAULT_EPSILON);
        let r = rate_of_change(&v, 3);
        assert_approx(r[3], 10.0, DEFAULT_EPSILON);
        let c = cumulative_return(&v, 3);
        assert_approx(c[3], 0.10, DEFAULT_EPSILON);
    }

    #[test]
    fn macd_warmup_indices() {
        let v: Vec<f64> = (0..60).map(|i| 100.0 + (i as f64 * 0.3).sin()).collect();
        let line = macd_line(&v);
        let signal = macd_signal(&v);
        let hist = macd_histogram(&v);
        assert!(line[24].is_nan());
        assert!(!line[25].is_nan());
        assert!(signal[32].is_nan());
        assert!(!signal[33].is_nan());
        assert_approx(hist[40], line[40] - signal[40], DEFAULT_EPSILON);
    }

    #[test]
    fn stochastic_k_position_in_range() {
        let h = [10.0, 12.0, 11.0];
        let l = [8.0, 9.0, 9.0];
        let c = [9.0, 11.0, 10.0];
        let out = stochastic_k(&h, &l, &c, 3);
        // range 8..12, close 10 -> 50%
        assert_approx(out[2], 50.0, DEFAULT_EPSILON);
    }

    #[test]
    fn stochastic_flat_range_is_50() {
        let h = [10.0; 5];
        let l = [10.0; 5];
        let c = [10.0; 5];
        let out = stochastic_k(&h, &l, &c, 3);
        assert_approx(out[4], 50.0, DEFAULT_EPSILON);
    }

    #[test]
    fn williams_r_is_negated_scale() {
        let h = [10.0, 12.0, 11.0];
        let l = [8.0, 9.0, 9.0];
        let c = [9.0, 11.0, 12.0];
        let out = williams_r(&h, &l, &c, 3);
        // close at the top of the range -> 0; here close 12 == hh -> 0.
        assert_approx(out[2], 0.0, DEFAULT_EPSILON);
    }

    #[test]
    fn cci_zero_deviation_is_zero() {
        let h = [10.0; 6];
        let l = [10.0; 6];
        let c = [10.0; 6];
        let out = cci(&h, &l, &c, 4);
        assert_approx(out[5], 0.0, DEFAULT_EPSILON);
    }

    #[test]
    fn cci_sign_follows_breakout() {
        let h = [10.0, 10.0, 10.0, 10.0, 14.0];
        let l = [9.0, 9.0, 9.0, 9.0, 13.0];
        let c = [9.5, 9.5, 9.5, 9.5, 13.5];
        let out = cci(&h, &l, &c, 5);
        assert!(out[4] > 100.0, "breakout day should push CCI above +100");
    }
}
