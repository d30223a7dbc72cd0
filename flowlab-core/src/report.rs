//! Backtest output: per-day records, curves, and summary statistics.
//!
//! Everything here is plain serializable data. The engine fills it in,
//! the CLI prints or saves it, and nothing downstream needs the price
//! database to interpret it.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::allocation::Allocation;
use crate::compress::CompressStats;
use crate::error::Warning;

/// One point on a value-over-time curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    pub date: NaiveDate,
    pub value: f64,
}

impl CurvePoint {
    pub fn new(date: NaiveDate, value: f64) -> Self {
        CurvePoint { date, value }
    }
}

/// Everything recorded for a single evaluated day. `allocation` is the
/// target decided on this day; the returns are the ones realized by it
/// under the run's execution convention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaySnapshot {
    pub date: NaiveDate,
    pub allocation: Allocation,
    pub gross_return: f64,
    pub net_return: f64,
    pub turnover: f64,
    pub cost: f64,
    /// Compounded equity after this day, first day starting from 1.
    pub equity: f64,
}

/// Calendar-month compounded net return, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonthlyReturn {
    pub year: i32,
    pub month: u32,
    pub pct: f64,
}

/// Headline statistics over the evaluated span. Ratios that need a
/// benchmark stay `None` when the run had none.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct SummaryStats {
    pub total_return: f64,
    pub cagr: f64,
    pub annualized_volatility: f64,
    pub sharpe: f64,
    pub sortino: f64,
    pub calmar: f64,
    /// Worst peak-to-trough drop, as a negative fraction.
    pub max_drawdown: f64,
    pub beta: Option<f64>,
    pub treynor: Option<f64>,
    pub win_rate: f64,
    pub avg_turnover: f64,
    pub avg_holdings: f64,
    pub best_day: f64,
    pub worst_day: f64,
    pub days: usize,
}

/// The full result of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestReport {
    /// Fingerprint of tree, settings, and date span. Two runs with the
    /// same id are the same backtest.
    pub run_id: String,
    pub equity: Vec<CurvePoint>,
    /// Drawdown from the running equity peak, as a negative fraction.
    pub drawdown: Vec<CurvePoint>,
    /// Benchmark equity normalized to 1 at the first evaluated day.
    pub benchmark: Option<Vec<CurvePoint>>,
    pub days: Vec<DaySnapshot>,
    pub monthly: Vec<MonthlyReturn>,
    pub summary: SummaryStats,
    pub warnings: Vec<Warning>,
    pub compression: CompressStats,
}

impl BacktestReport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Final equity multiple, 1.0 for an empty run.
    pub fn final_equity(&self) -> f64 {
        self.equity.last().map(|p| p.value).unwrap_or(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(ymd: (i32, u32, u32), net: f64, equity: f64) -> DaySnapshot {
        DaySnapshot {
            date: NaiveDate::from_ymd_opt(ymd.0, ymd.1, ymd.2).unwrap(),
            allocation: Allocation::single("SPY", 1.0),
            gross_return: net,
            net_return: net,
            turnover: 0.0,
            cost: 0.0,
            equity,
        }
    }

    #[test]
    fn report_round_trips_through_json() {
        let report = BacktestReport {
            run_id: "abc123".to_string(),
            equity: vec![CurvePoint::new(
                NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                1.01,
            )],
            drawdown: vec![CurvePoint::new(
                NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                0.0,
            )],
            benchmark: None,
            days: vec![day((2024, 1, 2), 0.01, 1.01)],
            monthly: vec![MonthlyReturn {
                year: 2024,
                month: 1,
                pct: 1.0,
            }],
            summary: SummaryStats {
                total_return: 0.01,
                days: 1,
                ..SummaryStats::default()
            },
            warnings: Vec::new(),
            compression: CompressStats::default(),
        };
        let json = report.to_json().unwrap();
        let back = BacktestReport::from_json(&json).unwrap();
        assert_eq!(back, report);
        assert!((back.final_equity() - 1.01).abs() < 1e-12);
    }

    #[test]
    fn missing_benchmark_serializes_as_null() {
        let report = BacktestReport {
            run_id: String::new(),
            equity: Vec::new(),
            drawdown: Vec::new(),
            benchmark: None,
            days: Vec::new(),
            monthly: Vec::new(),
            summary: SummaryStats::default(),
            warnings: Vec::new(),
            compression: CompressStats::default(),
        };
        let json = report.to_json().unwrap();
        assert!(json.contains("\"benchmark\": null"));
        assert!((report.final_equity() - 1.0).abs() < 1e-12);
    }
}
