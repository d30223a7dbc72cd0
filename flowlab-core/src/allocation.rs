//! Daily portfolio allocation: ticker symbol to fractional weight.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Slack tolerated on weight-sum checks throughout the engine.
pub const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Weights below this are dropped rather than carried as noise entries.
pub(crate) const MIN_WEIGHT: f64 = 1e-12;

/// The portfolio for one evaluation day: symbol to fraction of total
/// value, with the unallocated remainder as implicit cash.
///
/// Invariant: the weight sum never exceeds 1 + [`WEIGHT_TOLERANCE`].
/// Backed by a `BTreeMap` so iteration and serialization are
/// deterministic.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Allocation(BTreeMap<String, f64>);

impl Allocation {
    /// The all-cash allocation.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn single(symbol: impl Into<String>, weight: f64) -> Self {
        let mut a = Self::default();
        a.add(symbol.into(), weight);
        a
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of held symbols.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Weight for `symbol`, 0.0 when not held.
    pub fn weight(&self, symbol: &str) -> f64 {
        self.0.get(symbol).copied().unwrap_or(0.0)
    }

    /// Sum of all weights (1.0 minus the cash fraction).
    pub fn total(&self) -> f64 {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &f64)> {
        self.0.iter()
    }

    pub fn symbols(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// Accumulate `weight` onto `symbol`. Negligible weights are dropped.
    pub fn add(&mut self, symbol: impl Into<String>, weight: f64) {
        if weight < MIN_WEIGHT {
            return;
        }
        *self.0.entry(symbol.into()).or_insert(0.0) += weight;
    }

    /// Fold `other`'s holdings in, scaled by `factor`. This is how child
    /// weights compose multiplicatively up the tree.
    pub fn merge_scaled(&mut self, other: &Allocation, factor: f64) {
        for (symbol, w) in other.iter() {
            self.add(symbol.clone(), w * factor);
        }
    }

    /// Sum of absolute weight changes against `previous`, over the union
    /// of both days' symbols. Entering from all cash costs the full
    /// target weight.
    pub fn turnover(&self, previous: &Allocation) -> f64 {
        let mut total = 0.0;
        for (symbol, w) in self.iter() {
            total += (w - previous.weight(symbol)).abs();
        }
        for (symbol, w) in previous.iter() {
            if !self.0.contains_key(symbol) {
                total += w.abs();
            }
        }
        total
    }
}
