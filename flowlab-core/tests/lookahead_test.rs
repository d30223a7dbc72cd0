//! Look-ahead contamination tests for every metric kind.
//!
//! No metric value at bar t may depend on data from bar t+1 or later.
//!
//! Method: compute on the full series (200 bars) and on a truncated
//! prefix (100 bars). The first 100 values must be identical, NaN for
//! NaN. Any difference means future bars leaked into past values.

use flowlab_core::data::TickerSeries;
use flowlab_core::indicators::Metric;

/// Deterministic pseudo-random walk over OHLCV, LCG-driven so reruns
/// see the same series.
fn make_test_series(n: usize) -> TickerSeries {
    let mut close = Vec::with_capacity(n);
    let mut open = Vec::with_capacity(n);
    let mut high = Vec::with_capacity(n);
    let mut low = Vec::with_capacity(n);
    let mut volume = Vec::with_capacity(n);
    let mut price = 100.0f64;

    for i in 0..n {
        let seed = (i as u64)
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        let change = ((seed % 200) as f64 - 100.0) * 0.05;
        price = (price + change).max(10.0);

        let o = price - 0.5;
        let c = price + 0.3;
        open.push(o);
        close.push(c);
        high.push(o.max(c) + 2.0);
        low.push(o.min(c) - 2.0);
        volume.push(1_000_000.0 + ((seed >> 8) % 500_000) as f64);
    }

    TickerSeries {
        open: open.clone(),
        high,
        low,
        adj_close: close.clone(),
        adj_open: open,
        close,
        volume,
        first_valid: Some(0),
    }
}

fn truncated(series: &TickerSeries, n: usize) -> TickerSeries {
    TickerSeries {
        open: series.open[..n].to_vec(),
        high: series.high[..n].to_vec(),
        low: series.low[..n].to_vec(),
        close: series.close[..n].to_vec(),
        adj_close: series.adj_close[..n].to_vec(),
        adj_open: series.adj_open[..n].to_vec(),
        volume: series.volume[..n].to_vec(),
        first_valid: series.first_valid,
    }
}

/// Compare the shared prefix of the truncated and full computations.
fn assert_no_lookahead(metric: Metric, window: usize, full: &TickerSeries, cut: usize) {
    let short = truncated(full, cut);
    let full_values = metric.compute(full, window);
    let short_values = metric.compute(&short, window);

    assert_eq!(full_values.len(), full.close.len());
    assert_eq!(short_values.len(), cut);

    for i in 0..cut {
        let t = short_values[i];
        let f = full_values[i];
        if t.is_nan() && f.is_nan() {
            continue;
        }
        assert!(
            !t.is_nan() && !f.is_nan(),
            "{metric:?}({window}): NaN mismatch at bar {i} (truncated={t}, full={f})"
        );
        assert!(
            (t - f).abs() < 1e-10,
            "{metric:?}({window}): look-ahead at bar {i}: truncated={t}, full={f}"
        );
    }
}

#[test]
fn no_metric_reads_the_future() {
    let series = make_test_series(200);
    for metric in Metric::ALL {
        assert_no_lookahead(metric, 14, &series, 100);
    }
}

#[test]
fn short_and_long_windows_are_equally_causal() {
    let series = make_test_series(200);
    for metric in Metric::ALL {
        assert_no_lookahead(metric, 5, &series, 100);
        assert_no_lookahead(metric, 21, &series, 100);
    }
}

#[test]
fn truncating_one_bar_never_changes_history() {
    // The tightest cut: dropping only the newest bar must leave every
    // earlier value untouched, including recursive smoothers.
    let series = make_test_series(60);
    for metric in Metric::ALL {
        assert_no_lookahead(metric, 10, &series, 59);
    }
}
