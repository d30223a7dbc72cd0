//! Aligned per-ticker price arrays on a shared trading-day axis.
//!
//! The axis is the date intersection over symbols referenced by
//! indicators, so every indicator input is gap-free by construction.
//! Symbols held only as positions do not truncate the axis; they carry
//! NaN sentinels before their own history begins and enter the run at
//! their first fully valid day. Missing coverage is always NaN, never
//! zero.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::data::provider::{DataError, RawBar};

/// Which aligned array a metric reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriceField {
    Open,
    High,
    Low,
    Close,
    AdjClose,
    Volume,
}

/// One symbol's aligned arrays. All vectors share the axis length.
#[derive(Debug, Clone, Default)]
pub struct TickerSeries {
    pub open: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub close: Vec<f64>,
    pub adj_close: Vec<f64>,
    /// Open scaled by the day's adjustment ratio, for dividend-correct
    /// open-entry returns.
    pub adj_open: Vec<f64>,
    pub volume: Vec<f64>,
    /// First axis index with finite, positive open/close/adj_close, or
    /// None when the symbol never becomes tradable on this axis.
    pub first_valid: Option<usize>,
}

impl TickerSeries {
    pub fn field(&self, field: PriceField) -> &[f64] {
        match field {
            PriceField::Open => &self.open,
            PriceField::High => &self.high,
            PriceField::Low => &self.low,
            PriceField::Close => &self.close,
            PriceField::AdjClose => &self.adj_close,
            PriceField::Volume => &self.volume,
        }
    }
}

/// The shared date axis plus aligned arrays for every referenced symbol.
#[derive(Debug, Clone, Default)]
pub struct PriceDb {
    dates: Vec<NaiveDate>,
    series: BTreeMap<String, TickerSeries>,
}

impl PriceDb {
    /// Align raw bars onto a shared axis.
    ///
    /// `indicator_symbols` drives the axis rule: the axis is the date
    /// intersection over those symbols, or the union over all symbols
    /// when the set is empty (a strategy with no indicator references).
    /// Fails when fewer than 3 axis days remain, naming the symbol with
    /// the fewest raw bars as the limiting one.
    pub fn build(
        bars: &BTreeMap<String, Vec<RawBar>>,
        indicator_symbols: &BTreeSet<String>,
    ) -> Result<PriceDb, DataError> {
        if bars.is_empty() {
            return Err(DataError::Malformed("no symbols to align".to_string()));
        }

        let axis_symbols: Vec<&String> = if indicator_symbols.is_empty() {
            bars.keys().collect()
        } else {
            indicator_symbols.iter().collect()
        };

        let dates = if indicator_symbols.is_empty() {
            let mut union = BTreeSet::new();
            for symbol in &axis_symbols {
                if let Some(rows) = bars.get(*symbol) {
                    union.extend(rows.iter().map(|b| b.date));
                }
            }
            union
        } else {
            let mut iter = axis_symbols.iter();
            let first = iter.next().expect("non-empty axis symbol set");
            let mut shared: BTreeSet<NaiveDate> = bars
                .get(*first)
                .map(|rows| rows.iter().map(|b| b.date).collect())
                .unwrap_or_default();
            for symbol in iter {
                let other: BTreeSet<NaiveDate> = bars
                    .get(*symbol)
                    .map(|rows| rows.iter().map(|b| b.date).collect())
                    .unwrap_or_default();
                shared = shared.intersection(&other).copied().collect();
            }
            shared
        };

        if dates.len() < 3 {
            let limiting = axis_symbols
                .iter()
                .map(|s| (bars.get(*s).map(Vec::len).unwrap_or(0), s.as_str()))
                .min()
                .map(|(_, s)| s.to_string())
                .unwrap_or_default();
            return Err(DataError::InsufficientHistory {
                days: dates.len(),
                limiting,
            });
        }

        let dates: Vec<NaiveDate> = dates.into_iter().collect();
        let mut series = BTreeMap::new();
        for (symbol, rows) in bars {
            series.insert(symbol.clone(), align_one(&dates, rows));
        }

        Ok(PriceDb { dates, series })
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn date(&self, index: usize) -> NaiveDate {
        self.dates[index]
    }

    pub fn series(&self, symbol: &str) -> Option<&TickerSeries> {
        self.series.get(symbol)
    }

    pub fn field(&self, symbol: &str, field: PriceField) -> Option<&[f64]> {
        self.series.get(symbol).map(|s| s.field(field))
    }

    pub fn first_valid(&self, symbol: &str) -> Option<usize> {
        self.series.get(symbol).and_then(|s| s.first_valid)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &String> {
        self.series.keys()
    }
}

fn align_one(dates: &[NaiveDate], rows: &[RawBar]) -> TickerSeries {
    let by_date: HashMap<NaiveDate, &RawBar> = rows.iter().map(|b| (b.date, b)).collect();
    let n = dates.len();
    let mut out = TickerSeries {
        open: vec![f64::NAN; n],
        high: vec![f64::NAN; n],
        low: vec![f64::NAN; n],
        close: vec![f64::NAN; n],
        adj_close: vec![f64::NAN; n],
        adj_open: vec![f64::NAN; n],
        volume: vec![f64::NAN; n],
        first_valid: None,
    };

    for (i, date) in dates.iter().enumerate() {
        let Some(bar) = by_date.get(date) else {
            continue;
        };
        out.open[i] = bar.open;
        out.high[i] = bar.high;
        out.low[i] = bar.low;
        out.close[i] = bar.close;
        out.adj_close[i] = bar.adj_close;
        out.volume[i] = bar.volume;
        if bar.close.is_finite() && bar.close > 0.0 {
            out.adj_open[i] = bar.open * bar.adj_close / bar.close;
        }

        let valid = [bar.open, bar.close, bar.adj_close]
            .iter()
            .all(|v| v.is_finite() && *v > 0.0);
        if valid && out.first_valid.is_none() {
            out.first_valid = Some(i);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(y: i32, m: u32, d: u32, close: f64) -> RawBar {
        RawBar {
            date: NaiveDate::from_ymd_opt(y, m, d).unwrap(),
            open: close - 0.5,
            high: close + 1.0,
            low: close - 1.0,
            close,
            adj_close: close * 0.9,
            volume: 1000.0,
        }
    }

    fn day_bars(start_day: u32, n: u32, base: f64) -> Vec<RawBar> {
        (0..n)
            .map(|i| bar(2024, 1, start_day + i, base + i as f64))
            .collect()
    }

    fn symbols(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn axis_is_intersection_of_indicator_symbols() {
        let mut bars = BTreeMap::new();
        bars.insert("AAA".to_string(), day_bars(2, 6, 100.0)); // Jan 2..7
        bars.insert("BBB".to_string(), day_bars(4, 6, 50.0)); // Jan 4..9

        let db = PriceDb::build(&bars, &symbols(&["AAA", "BBB"])).unwrap();
        assert_eq!(db.len(), 4); // Jan 4..7
        assert_eq!(db.date(0), NaiveDate::from_ymd_opt(2024, 1, 4).unwrap());
        assert_eq!(db.date(3), NaiveDate::from_ymd_opt(2024, 1, 7).unwrap());
    }

    #[test]
    fn position_only_symbol_does_not_truncate_axis() {
        let mut bars = BTreeMap::new();
        bars.insert("IND".to_string(), day_bars(2, 10, 100.0)); // Jan 2..11
        bars.insert("POS".to_string(), day_bars(8, 4, 20.0)); // Jan 8..11

        let db = PriceDb::build(&bars, &symbols(&["IND"])).unwrap();
        assert_eq!(db.len(), 10);

        // POS carries NaN sentinels before its own start, never zero.
        let pos = db.series("POS").unwrap();
        assert!(pos.close[0].is_nan());
        assert!(pos.close[5].is_nan());
        assert_eq!(pos.first_valid, Some(6)); // Jan 8 at axis index 6
        assert!(pos.close[6] > 0.0);
    }

    #[test]
    fn union_axis_when_no_indicator_symbols() {
        let mut bars = BTreeMap::new();
        bars.insert("AAA".to_string(), day_bars(2, 3, 100.0));
        bars.insert("BBB".to_string(), day_bars(4, 3, 50.0));

        let db = PriceDb::build(&bars, &BTreeSet::new()).unwrap();
        assert_eq!(db.len(), 5); // Jan 2,3,4,5,6
    }

    #[test]
    fn short_overlap_names_limiting_symbol() {
        let mut bars = BTreeMap::new();
        bars.insert("LONG".to_string(), day_bars(2, 10, 100.0));
        bars.insert("SHORT".to_string(), day_bars(2, 2, 10.0));

        let err = PriceDb::build(&bars, &symbols(&["LONG", "SHORT"])).unwrap_err();
        match err {
            DataError::InsufficientHistory { days, limiting } => {
                assert_eq!(days, 2);
                assert_eq!(limiting, "SHORT");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn indicator_symbol_with_no_bars_is_limiting() {
        let mut bars = BTreeMap::new();
        bars.insert("AAA".to_string(), day_bars(2, 10, 100.0));
        bars.insert("GONE".to_string(), Vec::new());

        let err = PriceDb::build(&bars, &symbols(&["AAA", "GONE"])).unwrap_err();
        match err {
            DataError::InsufficientHistory { days, limiting } => {
                assert_eq!(days, 0);
                assert_eq!(limiting, "GONE");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn adj_open_uses_adjustment_ratio() {
        let mut bars = BTreeMap::new();
        bars.insert("AAA".to_string(), day_bars(2, 4, 100.0));
        let db = PriceDb::build(&bars, &symbols(&["AAA"])).unwrap();
        let s = db.series("AAA").unwrap();
        // adj_close = close * 0.9, so adj_open = open * 0.9.
        assert!((s.adj_open[0] - s.open[0] * 0.9).abs() < 1e-12);
    }

    #[test]
    fn field_accessor_maps_all_arrays() {
        let mut bars = BTreeMap::new();
        bars.insert("AAA".to_string(), day_bars(2, 4, 100.0));
        let db = PriceDb::build(&bars, &symbols(&["AAA"])).unwrap();
        for field in [
            PriceField::Open,
            PriceField::High,
            PriceField::Low,
            PriceField::Close,
            PriceField::AdjClose,
            PriceField::Volume,
        ] {
            assert_eq!(db.field("AAA", field).unwrap().len(), 4);
        }
        assert!(db.field("ZZZ", PriceField::Close).is_none());
    }
}
