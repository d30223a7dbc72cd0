//! Condition lines and their grouping.
//!
//! A branching node carries an ordered list of lines. The first line
//! opens with `If`; each following line chains with `And` or `Or`.
//! `Or` binds looser than `And`: the list reads as OR-of-AND-groups,
//! so `If a And b Or c` means `(a AND b) OR (c)`. [`clauses`] performs
//! that split.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::indicators::Metric;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Connector {
    If,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Comparator {
    LessThan,
    GreaterThan,
    /// True on the day the left side moves from at-or-above to below.
    CrossesBelow,
    /// True on the day the left side moves from at-or-below to above.
    CrossesAbove,
}

impl Comparator {
    pub fn is_cross(self) -> bool {
        matches!(self, Comparator::CrossesBelow | Comparator::CrossesAbove)
    }
}

/// One indicator request: metric, lookback window, and the symbol whose
/// series it reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorExpr {
    pub metric: Metric,
    pub window: usize,
    pub symbol: String,
}

impl fmt::Display for IndicatorExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({}) of {}", self.metric, self.window, self.symbol)
    }
}

/// Right-hand side of a comparison: a constant or another indicator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    Value(f64),
    Expr(IndicatorExpr),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Value(v) => write!(f, "{v}"),
            Operand::Expr(e) => e.fmt(f),
        }
    }
}

/// One line of a condition list. `streak` requires the comparison to
/// hold for that many consecutive days ending today; 1 is the plain
/// single-day test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionLine {
    pub connector: Connector,
    pub left: IndicatorExpr,
    pub comparator: Comparator,
    pub right: Operand,
    #[serde(default = "default_streak")]
    pub streak: usize,
}

fn default_streak() -> usize {
    1
}

impl ConditionLine {
    pub fn new(
        connector: Connector,
        left: IndicatorExpr,
        comparator: Comparator,
        right: Operand,
    ) -> Self {
        Self {
            connector,
            left,
            comparator,
            right,
            streak: 1,
        }
    }
}

impl fmt::Display for ConditionLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:?} {}", self.left, self.comparator, self.right)?;
        if self.streak > 1 {
            write!(f, " for {} days", self.streak)?;
        }
        Ok(())
    }
}

/// Split a line list into its AND-groups. A new group starts at every
/// `Or`; the leading line always starts the first group whatever its
/// connector says.
pub fn clauses(lines: &[ConditionLine]) -> Vec<&[ConditionLine]> {
    let mut out = Vec::new();
    let mut start = 0usize;
    for (i, line) in lines.iter().enumerate() {
        if i > 0 && line.connector == Connector::Or {
            out.push(&lines[start..i]);
            start = i;
        }
    }
    if start < lines.len() {
        out.push(&lines[start..]);
    }
    out
}

/// Whether any non-leading line chains with `Or`.
pub fn has_or(lines: &[ConditionLine]) -> bool {
    lines.iter().skip(1).any(|l| l.connector == Connector::Or)
}
