//! Error and diagnostic types shared across the engine.
//!
//! Two severities exist. `ValidationIssue`s are collected before the day
//! loop and abort the run; `Warning`s are collected during the loop and
//! never interrupt it. A failed validation produces no partial results; a
//! run with only warnings produces complete results plus the list.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::provider::DataError;

/// Node-level id used for issues that concern the run as a whole rather
/// than a specific node (e.g. "no tickers found").
pub const RUN_SCOPE: &str = "run";

/// A pre-flight problem with the strategy or its inputs.
///
/// Issues are gathered into one list so a caller can surface every
/// problem at once instead of one fix-and-resubmit cycle per issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// External id of the offending node, or [`RUN_SCOPE`].
    pub node_id: String,
    /// Field within the node that triggered the issue.
    pub field: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(
        node_id: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}: {}", self.node_id, self.field, self.message)
    }
}

/// A non-fatal anomaly observed while evaluating one trading day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub date: NaiveDate,
    pub message: String,
}

impl Warning {
    pub fn new(date: NaiveDate, message: impl Into<String>) -> Self {
        Self {
            date,
            message: message.into(),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.date, self.message)
    }
}

/// Top-level failure of a backtest invocation.
#[derive(Debug, Error)]
pub enum BacktestError {
    #[error("validation failed with {} issue(s)", .0.len())]
    Validation(Vec<ValidationIssue>),
    #[error(transparent)]
    Data(#[from] DataError),
}

impl BacktestError {
    /// The validation issues, if this is a validation failure.
    pub fn issues(&self) -> &[ValidationIssue] {
        match self {
            BacktestError::Validation(issues) => issues,
            BacktestError::Data(_) => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_display_includes_node_and_field() {
        let issue = ValidationIssue::new("n3", "window", "must be positive");
        assert_eq!(issue.to_string(), "n3.window: must be positive");
    }

    #[test]
    fn warning_display_includes_date() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let w = Warning::new(date, "missing price for XYZ");
        assert_eq!(w.to_string(), "2024-03-15: missing price for XYZ");
    }

    #[test]
    fn validation_error_reports_count() {
        let err = BacktestError::Validation(vec![
            ValidationIssue::new("a", "f", "m"),
            ValidationIssue::new("b", "g", "m"),
        ]);
        assert_eq!(err.to_string(), "validation failed with 2 issue(s)");
        assert_eq!(err.issues().len(), 2);
    }
}
