//! Run-level settings: execution convention, cost model, benchmark.

use serde::{Deserialize, Serialize};

/// When during the day an allocation decision executes, and which two
/// prices bound one holding period.
///
/// Open-entry conventions carry one extra day of indicator lag: a
/// decision that executes at the open can only have seen data through
/// the prior close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionConvention {
    OpenToOpen,
    OpenToClose,
    CloseToOpen,
    CloseToClose,
}

impl ExecutionConvention {
    pub const ALL: [ExecutionConvention; 4] = [
        ExecutionConvention::OpenToOpen,
        ExecutionConvention::OpenToClose,
        ExecutionConvention::CloseToOpen,
        ExecutionConvention::CloseToClose,
    ];

    /// Days between the decision index and the newest indicator data the
    /// decision is allowed to read.
    pub fn indicator_lag(self) -> usize {
        match self {
            ExecutionConvention::OpenToOpen | ExecutionConvention::OpenToClose => 1,
            ExecutionConvention::CloseToOpen | ExecutionConvention::CloseToClose => 0,
        }
    }

    pub fn enters_at_open(self) -> bool {
        self.indicator_lag() == 1
    }

    pub fn label(self) -> &'static str {
        match self {
            ExecutionConvention::OpenToOpen => "open-to-open",
            ExecutionConvention::OpenToClose => "open-to-close",
            ExecutionConvention::CloseToOpen => "close-to-open",
            ExecutionConvention::CloseToClose => "close-to-close",
        }
    }
}

impl Default for ExecutionConvention {
    fn default() -> Self {
        ExecutionConvention::CloseToClose
    }
}

/// Settings for a single backtest run. Deserializes from TOML or JSON
/// with every field optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    pub convention: ExecutionConvention,
    /// Transaction cost charged on turnover, in basis points.
    pub cost_bps: f64,
    /// Benchmark symbol for the relative curve, beta, and Treynor.
    pub benchmark: Option<String>,
    /// Row-count limit passed to the bar source per symbol.
    pub max_bars: usize,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            convention: ExecutionConvention::default(),
            cost_bps: 0.0,
            benchmark: None,
            max_bars: 5000,
        }
    }
}

impl RunSettings {
    /// Cost per unit of turnover as a fraction.
    pub fn cost_rate(&self) -> f64 {
        self.cost_bps / 10_000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings() {
        let s = RunSettings::default();
        assert_eq!(s.convention, ExecutionConvention::CloseToClose);
        assert_eq!(s.cost_bps, 0.0);
        assert_eq!(s.max_bars, 5000);
        assert!(s.benchmark.is_none());
    }

    #[test]
    fn indicator_lag_per_convention() {
        assert_eq!(ExecutionConvention::OpenToOpen.indicator_lag(), 1);
        assert_eq!(ExecutionConvention::OpenToClose.indicator_lag(), 1);
        assert_eq!(ExecutionConvention::CloseToOpen.indicator_lag(), 0);
        assert_eq!(ExecutionConvention::CloseToClose.indicator_lag(), 0);
    }

    #[test]
    fn cost_rate_from_bps() {
        let s = RunSettings {
            cost_bps: 25.0,
            ..RunSettings::default()
        };
        assert!((s.cost_rate() - 0.0025).abs() < 1e-15);
    }

    #[test]
    fn convention_parses_screaming_snake() {
        let c: ExecutionConvention = serde_json::from_str("\"OPEN_TO_CLOSE\"").unwrap();
        assert_eq!(c, ExecutionConvention::OpenToClose);
    }

    #[test]
    fn settings_parse_with_partial_fields() {
        let s: RunSettings =
            serde_json::from_str(r#"{"convention":"CLOSE_TO_OPEN","cost_bps":10.0}"#).unwrap();
        assert_eq!(s.convention, ExecutionConvention::CloseToOpen);
        assert_eq!(s.cost_bps, 10.0);
        assert_eq!(s.max_bars, 5000);
    }
}
