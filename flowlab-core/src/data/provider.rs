//! The bar-source port: how raw daily bars enter the engine.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One raw daily bar as delivered by a source, before alignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub adj_close: f64,
    pub volume: f64,
}

/// Errors raised while fetching or aligning bar data.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("no bars available for symbol {0}")]
    NoData(String),

    #[error("source error for {symbol}: {message}")]
    Source { symbol: String, message: String },

    #[error("insufficient overlapping history: {days} shared day(s), limited by {limiting}")]
    InsufficientHistory { days: usize, limiting: String },

    #[error("malformed bar data: {0}")]
    Malformed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Where daily bars come from.
///
/// `fetch` retrieves one symbol with a row-count limit (the newest rows
/// win). The engine itself only ever calls `fetch_batch`, exactly once
/// per run and before the day loop, so an implementation backed by a
/// remote service can answer all symbols with a single outbound request
/// set instead of one round trip per ticker.
pub trait BarSource {
    fn name(&self) -> &str;

    fn fetch(&self, symbol: &str, max_rows: usize) -> Result<Vec<RawBar>, DataError>;

    fn fetch_batch(
        &self,
        symbols: &BTreeSet<String>,
        max_rows: usize,
    ) -> Result<BTreeMap<String, Vec<RawBar>>, DataError> {
        let mut out = BTreeMap::new();
        for symbol in symbols {
            out.insert(symbol.clone(), self.fetch(symbol, max_rows)?);
        }
        Ok(out)
    }
}

/// In-memory source for tests, benches, and embedding callers that
/// already hold bar series.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBars {
    bars: BTreeMap<String, Vec<RawBar>>,
}

impl InMemoryBars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, symbol: impl Into<String>, bars: Vec<RawBar>) {
        self.bars.insert(symbol.into(), bars);
    }

    pub fn with(mut self, symbol: impl Into<String>, bars: Vec<RawBar>) -> Self {
        self.insert(symbol, bars);
        self
    }
}

impl BarSource for InMemoryBars {
    fn name(&self) -> &str {
        "memory"
    }

    fn fetch(&self, symbol: &str, max_rows: usize) -> Result<Vec<RawBar>, DataError> {
        let bars = self
            .bars
            .get(symbol)
            .ok_or_else(|| DataError::NoData(symbol.to_string()))?;
        let skip = bars.len().saturating_sub(max_rows);
        Ok(bars[skip..].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(y: i32, m: u32, d: u32, close: f64) -> RawBar {
        RawBar {
            date: NaiveDate::from_ymd_opt(y, m, d).unwrap(),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            adj_close: close,
            volume: 1000.0,
        }
    }

    #[test]
    fn in_memory_fetch_keeps_newest_rows() {
        let source = InMemoryBars::new().with(
            "SPY",
            vec![
                bar(2024, 1, 2, 100.0),
                bar(2024, 1, 3, 101.0),
                bar(2024, 1, 4, 102.0),
            ],
        );
        let got = source.fetch("SPY", 2).unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].close, 101.0);
        assert_eq!(got[1].close, 102.0);
    }

    #[test]
    fn in_memory_fetch_unknown_symbol_errors() {
        let source = InMemoryBars::new();
        let err = source.fetch("QQQ", 100).unwrap_err();
        assert!(matches!(err, DataError::NoData(s) if s == "QQQ"));
    }

    #[test]
    fn fetch_batch_covers_all_symbols() {
        let source = InMemoryBars::new()
            .with("AAA", vec![bar(2024, 1, 2, 10.0)])
            .with("BBB", vec![bar(2024, 1, 2, 20.0)]);
        let symbols: BTreeSet<String> = ["AAA".to_string(), "BBB".to_string()].into();
        let batch = source.fetch_batch(&symbols, 100).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch["AAA"][0].close, 10.0);
        assert_eq!(batch["BBB"][0].close, 20.0);
    }
}
