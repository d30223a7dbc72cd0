//! Summary statistics over a run's daily net returns.
//!
//! Conventions: a year is 252 trading days, dispersion uses the sample
//! standard deviation, and ratios whose denominator degenerates come
//! back as 0 rather than infinity. Benchmark-relative figures are
//! `Option` and stay `None` without a benchmark.

use crate::report::{DaySnapshot, SummaryStats};

/// Annualization base used across metrics and indicators.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Fill the headline table from the evaluated days. `benchmark` is the
/// benchmark's daily returns aligned index-for-index with `days`.
pub fn compute_summary(days: &[DaySnapshot], benchmark: Option<&[f64]>) -> SummaryStats {
    if days.is_empty() {
        return SummaryStats::default();
    }
    let returns: Vec<f64> = days.iter().map(|d| d.net_return).collect();
    let equity: Vec<f64> = days.iter().map(|d| d.equity).collect();
    let n = returns.len();
    let final_equity = equity[n - 1];

    let growth = cagr(final_equity, n);
    let max_dd = max_drawdown(&equity);
    let calmar = if max_dd.abs() > f64::EPSILON {
        growth / max_dd.abs()
    } else {
        0.0
    };
    let beta = benchmark.and_then(|b| beta(&returns, b));
    let treynor = beta.and_then(|b| (b.abs() > 1e-12).then(|| growth / b));

    SummaryStats {
        total_return: final_equity - 1.0,
        cagr: growth,
        annualized_volatility: std_dev(&returns) * TRADING_DAYS_PER_YEAR.sqrt(),
        sharpe: sharpe_ratio(&returns),
        sortino: sortino_ratio(&returns),
        calmar,
        max_drawdown: max_dd,
        beta,
        treynor,
        win_rate: returns.iter().filter(|r| **r > 0.0).count() as f64 / n as f64,
        avg_turnover: days.iter().map(|d| d.turnover).sum::<f64>() / n as f64,
        avg_holdings: days.iter().map(|d| d.allocation.len() as f64).sum::<f64>() / n as f64,
        best_day: returns.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b)),
        worst_day: returns.iter().fold(f64::INFINITY, |a, &b| a.min(b)),
        days: n,
    }
}

/// Compound annual growth rate from a final equity multiple over
/// `days` trading days.
pub fn cagr(final_equity: f64, days: usize) -> f64 {
    if days == 0 || final_equity <= 0.0 {
        return 0.0;
    }
    final_equity.powf(TRADING_DAYS_PER_YEAR / days as f64) - 1.0
}

/// Worst peak-to-trough drop of an equity curve, as a negative
/// fraction. 0 for curves that never fall below their running peak.
pub fn max_drawdown(equity: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0f64;
    for &value in equity {
        if value > peak {
            peak = value;
        } else if peak > 0.0 {
            worst = worst.min(value / peak - 1.0);
        }
    }
    worst
}

/// Annualized mean-over-dispersion of daily returns, 0 when the
/// returns do not disperse.
pub fn sharpe_ratio(returns: &[f64]) -> f64 {
    let sd = std_dev(returns);
    if sd < 1e-15 {
        return 0.0;
    }
    mean(returns) / sd * TRADING_DAYS_PER_YEAR.sqrt()
}

/// Like Sharpe, but dispersion counts only losing days: the downside
/// deviation is the RMS of negative returns over the full day count.
pub fn sortino_ratio(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let downside: f64 = returns.iter().filter(|r| **r < 0.0).map(|r| r * r).sum();
    let dd = (downside / returns.len() as f64).sqrt();
    if dd < 1e-15 {
        return 0.0;
    }
    mean(returns) / dd * TRADING_DAYS_PER_YEAR.sqrt()
}

/// Regression slope of the run's returns on the benchmark's. `None`
/// for fewer than two paired days or a flat benchmark.
pub fn beta(returns: &[f64], benchmark: &[f64]) -> Option<f64> {
    let n = returns.len().min(benchmark.len());
    if n < 2 {
        return None;
    }
    let mr = mean(&returns[..n]);
    let mb = mean(&benchmark[..n]);
    let mut cov = 0.0;
    let mut var = 0.0;
    for i in 0..n {
        let db = benchmark[i] - mb;
        cov += (returns[i] - mr) * db;
        var += db * db;
    }
    if var < 1e-15 {
        None
    } else {
        Some(cov / var)
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation, 0 for fewer than two values.
pub fn std_dev(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let m = mean(values);
    let ss: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    (ss / (n - 1) as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::Allocation;
    use crate::indicators::assert_approx;
    use chrono::NaiveDate;

    // ─── Single metrics ──────────────────────────────────────────────

    #[test]
    fn cagr_annualizes_over_trading_days() {
        // Doubling over two trading years compounds to sqrt(2) - 1 per year.
        assert_approx(cagr(2.0, 504), 2.0f64.sqrt() - 1.0, 1e-12);
        assert_approx(cagr(1.0, 252), 0.0, 1e-12);
        assert_eq!(cagr(0.0, 252), 0.0);
        assert_eq!(cagr(2.0, 0), 0.0);
    }

    #[test]
    fn max_drawdown_finds_the_deepest_trough() {
        let equity = [1.0, 1.2, 0.9, 1.3, 1.1];
        // 0.9 against the 1.2 peak is -25%; 1.1 against 1.3 is shallower.
        assert_approx(max_drawdown(&equity), -0.25, 1e-12);
        assert_eq!(max_drawdown(&[1.0, 1.1, 1.2]), 0.0);
        assert_eq!(max_drawdown(&[]), 0.0);
    }

    #[test]
    fn sharpe_hand_computed() {
        // mean 0.01, sample sd sqrt(0.0002): 0.70711 daily, annualized.
        let returns = [0.02, 0.0];
        assert_approx(
            sharpe_ratio(&returns),
            0.01 / 0.0002f64.sqrt() * 252.0f64.sqrt(),
            1e-12,
        );
        assert_eq!(sharpe_ratio(&[0.01, 0.01, 0.01]), 0.0, "no dispersion");
    }

    #[test]
    fn sortino_counts_only_losing_days() {
        let returns = [0.02, -0.01, 0.03];
        let mean = 0.04 / 3.0;
        let dd = (0.0001f64 / 3.0).sqrt();
        assert_approx(sortino_ratio(&returns), mean / dd * 252.0f64.sqrt(), 1e-9);
        assert_eq!(sortino_ratio(&[0.01, 0.02]), 0.0, "no losing days");
    }

    #[test]
    fn beta_recovers_leverage() {
        let benchmark = [0.01, -0.02, 0.015, 0.005];
        let doubled: Vec<f64> = benchmark.iter().map(|r| 2.0 * r).collect();
        assert_approx(beta(&doubled, &benchmark).unwrap(), 2.0, 1e-12);
        assert_eq!(beta(&[0.01, 0.02], &[0.0, 0.0]), None, "flat benchmark");
        assert_eq!(beta(&[0.01], &[0.01]), None, "one day");
    }

    // ─── Summary assembly ────────────────────────────────────────────

    fn snapshot(day: u32, net: f64, equity: f64, turnover: f64) -> DaySnapshot {
        DaySnapshot {
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            allocation: Allocation::single("SPY", 1.0),
            gross_return: net,
            net_return: net,
            turnover,
            cost: 0.0,
            equity,
        }
    }

    #[test]
    fn summary_aggregates_the_day_records() {
        let days = vec![
            snapshot(2, 0.01, 1.01, 1.0),
            snapshot(3, -0.01, 0.9999, 0.0),
            snapshot(4, 0.02, 1.019898, 0.5),
        ];
        let summary = compute_summary(&days, None);
        assert_eq!(summary.days, 3);
        assert_approx(summary.total_return, 0.019898, 1e-9);
        assert_approx(summary.win_rate, 2.0 / 3.0, 1e-12);
        assert_approx(summary.avg_turnover, 0.5, 1e-12);
        assert_approx(summary.avg_holdings, 1.0, 1e-12);
        assert_approx(summary.best_day, 0.02, 1e-12);
        assert_approx(summary.worst_day, -0.01, 1e-12);
        assert_eq!(summary.beta, None);
        assert_eq!(summary.treynor, None);
    }

    #[test]
    fn summary_with_benchmark_fills_beta_and_treynor() {
        let days = vec![
            snapshot(2, 0.02, 1.02, 0.0),
            snapshot(3, -0.04, 0.9792, 0.0),
            snapshot(4, 0.03, 1.008576, 0.0),
        ];
        let benchmark = [0.01, -0.02, 0.015];
        let summary = compute_summary(&days, Some(&benchmark));
        assert_approx(summary.beta.unwrap(), 2.0, 1e-9);
        assert_approx(
            summary.treynor.unwrap(),
            summary.cagr / 2.0,
            1e-9,
        );
    }

    #[test]
    fn empty_run_is_all_zeroes() {
        let summary = compute_summary(&[], None);
        assert_eq!(summary, SummaryStats::default());
    }
}
