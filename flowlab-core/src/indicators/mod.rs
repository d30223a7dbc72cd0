//! Technical indicators over aligned price series.
//!
//! Every computation takes the full series for one symbol and returns a
//! same-length `Vec<f64>` with NaN where the value is not yet defined
//! (warmup, missing history). Callers treat NaN as "unavailable", never
//! as zero. [`Metric`] names each supported kind and dispatches to the
//! family modules; [`IndicatorCache`] memoizes whole series per
//! (symbol, metric, window) so a backtest computes each series once.

pub mod moving;
pub mod oscillators;
pub mod trend;
pub mod volatility;
pub mod volume;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::data::{PriceDb, TickerSeries};

/// Every metric a condition, ranking, or weighting can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Metric {
    // Price level (raw close)
    CurrentPrice,
    PreviousClose,
    HighestClose,
    LowestClose,
    // Moving averages (adjusted close)
    Sma,
    Ema,
    Wma,
    Dema,
    Tema,
    Trima,
    Kama,
    Hma,
    Vwma,
    // RSI family (adjusted close)
    Rsi,
    CutlerRsi,
    StochRsi,
    // Momentum (adjusted close unless noted)
    Momentum,
    RateOfChange,
    CumulativeReturn,
    MacdLine,
    MacdSignal,
    MacdHistogram,
    StochasticK,
    StochasticD,
    WilliamsR,
    Cci,
    // Volatility and drawdown (adjusted close; ATR on raw OHLC)
    StdDevPrice,
    StdDevReturns,
    AnnualizedVolatility,
    Atr,
    NormalizedAtr,
    MaxDrawdownOver,
    DrawdownFromHigh,
    UlcerIndex,
    // Trend (adjusted close; ADX and Aroon on raw OHLC)
    LinRegValue,
    LinRegSlope,
    LinRegIntercept,
    RSquared,
    Adx,
    AroonUp,
    AroonDown,
    AroonOscillator,
    // Volume
    Volume,
    VolumeSma,
    Obv,
    Vwap,
    Mfi,
    ChaikinMoneyFlow,
}

impl Metric {
    pub const ALL: [Metric; 48] = [
        Metric::CurrentPrice,
        Metric::PreviousClose,
        Metric::HighestClose,
        Metric::LowestClose,
        Metric::Sma,
        Metric::Ema,
        Metric::Wma,
        Metric::Dema,
        Metric::Tema,
        Metric::Trima,
        Metric::Kama,
        Metric::Hma,
        Metric::Vwma,
        Metric::Rsi,
        Metric::CutlerRsi,
        Metric::StochRsi,
        Metric::Momentum,
        Metric::RateOfChange,
        Metric::CumulativeReturn,
        Metric::MacdLine,
        Metric::MacdSignal,
        Metric::MacdHistogram,
        Metric::StochasticK,
        Metric::StochasticD,
        Metric::WilliamsR,
        Metric::Cci,
        Metric::StdDevPrice,
        Metric::StdDevReturns,
        Metric::AnnualizedVolatility,
        Metric::Atr,
        Metric::NormalizedAtr,
        Metric::MaxDrawdownOver,
        Metric::DrawdownFromHigh,
        Metric::UlcerIndex,
        Metric::LinRegValue,
        Metric::LinRegSlope,
        Metric::LinRegIntercept,
        Metric::RSquared,
        Metric::Adx,
        Metric::AroonUp,
        Metric::AroonDown,
        Metric::AroonOscillator,
        Metric::Volume,
        Metric::VolumeSma,
        Metric::Obv,
        Metric::Vwap,
        Metric::Mfi,
        Metric::ChaikinMoneyFlow,
    ];

    /// Fewest axis days before index `min_history - 1` can be defined,
    /// for a window of `w`. Validation compares this against the axis.
    pub fn min_history(self, w: usize) -> usize {
        use Metric::*;
        match self {
            CurrentPrice | Volume | Obv => 1,
            PreviousClose => 2,
            HighestClose | LowestClose | Sma | Ema | Wma | Vwma | StochasticK | WilliamsR
            | Cci | StdDevPrice | MaxDrawdownOver | DrawdownFromHigh | UlcerIndex
            | LinRegValue | LinRegSlope | LinRegIntercept | RSquared | VolumeSma | Vwap
            | ChaikinMoneyFlow => w,
            Dema => 2 * w.saturating_sub(1) + 1,
            Tema => 3 * w.saturating_sub(1) + 1,
            Trima => {
                let n1 = (w + 1) / 2;
                let n2 = w / 2 + 1;
                n1 + n2 - 1
            }
            Kama | Rsi | CutlerRsi | Momentum | RateOfChange | CumulativeReturn
            | StdDevReturns | AnnualizedVolatility | Atr | NormalizedAtr | AroonUp
            | AroonDown | AroonOscillator | Mfi => w + 1,
            Hma => {
                let s = ((w as f64).sqrt().round() as usize).max(1);
                w + s - 1
            }
            StochRsi | Adx => 2 * w,
            StochasticD => w + 2,
            MacdLine => 26,
            MacdSignal | MacdHistogram => 34,
        }
    }

    /// Whether the window parameter participates. MACD's structure is
    /// fixed at 12/26/9 and OBV runs from the axis start.
    pub fn uses_window(self) -> bool {
        !matches!(
            self,
            Metric::CurrentPrice
                | Metric::PreviousClose
                | Metric::MacdLine
                | Metric::MacdSignal
                | Metric::MacdHistogram
                | Metric::Volume
                | Metric::Obv
        )
    }

    /// Compute the full series for one symbol.
    pub fn compute(self, s: &TickerSeries, window: usize) -> Vec<f64> {
        use Metric::*;
        let ac = &s.adj_close;
        match self {
            CurrentPrice => s.close.clone(),
            PreviousClose => shift_back(&s.close),
            HighestClose => rolling_extreme(&s.close, window, f64::max, f64::MIN),
            LowestClose => rolling_extreme(&s.close, window, f64::min, f64::MAX),
            Sma => moving::sma(ac, window),
            Ema => moving::ema(ac, window),
            Wma => moving::wma(ac, window),
            Dema => moving::dema(ac, window),
            Tema => moving::tema(ac, window),
            Trima => moving::trima(ac, window),
            Kama => moving::kama(ac, window),
            Hma => moving::hma(ac, window),
            Vwma => moving::vwma(ac, &s.volume, window),
            Rsi => oscillators::rsi(ac, window),
            CutlerRsi => oscillators::cutler_rsi(ac, window),
            StochRsi => oscillators::stoch_rsi(ac, window),
            Momentum => oscillators::momentum(ac, window),
            RateOfChange => oscillators::rate_of_change(ac, window),
            CumulativeReturn => oscillators::cumulative_return(ac, window),
            MacdLine => oscillators::macd_line(ac),
            MacdSignal => oscillators::macd_signal(ac),
            MacdHistogram => oscillators::macd_histogram(ac),
            StochasticK => oscillators::stochastic_k(&s.high, &s.low, &s.close, window),
            StochasticD => oscillators::stochastic_d(&s.high, &s.low, &s.close, window),
            WilliamsR => oscillators::williams_r(&s.high, &s.low, &s.close, window),
            Cci => oscillators::cci(&s.high, &s.low, &s.close, window),
            StdDevPrice => volatility::stddev(ac, window),
            StdDevReturns => volatility::stddev_returns(ac, window),
            AnnualizedVolatility => volatility::annualized_volatility(ac, window),
            Atr => volatility::atr(&s.high, &s.low, &s.close, window),
            NormalizedAtr => volatility::normalized_atr(&s.high, &s.low, &s.close, window),
            MaxDrawdownOver => volatility::max_drawdown_over(ac, window),
            DrawdownFromHigh => volatility::drawdown_from_high(ac, window),
            UlcerIndex => volatility::ulcer_index(ac, window),
            LinRegValue => trend::linreg_value(ac, window),
            LinRegSlope => trend::linreg_slope(ac, window),
            LinRegIntercept => trend::linreg_intercept(ac, window),
            RSquared => trend::r_squared(ac, window),
            Adx => trend::adx(&s.high, &s.low, &s.close, window),
            AroonUp => trend::aroon_up(&s.high, window),
            AroonDown => trend::aroon_down(&s.low, window),
            AroonOscillator => trend::aroon_oscillator(&s.high, &s.low, window),
            Volume => s.volume.clone(),
            VolumeSma => volume::volume_sma(&s.volume, window),
            Obv => volume::obv(&s.close, &s.volume),
            Vwap => volume::vwap(&s.high, &s.low, &s.close, &s.volume, window),
            Mfi => volume::mfi(&s.high, &s.low, &s.close, &s.volume, window),
            ChaikinMoneyFlow => {
                volume::chaikin_money_flow(&s.high, &s.low, &s.close, &s.volume, window)
            }
        }
    }
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    symbol: String,
    metric: Metric,
    window: usize,
}

/// Per-run memo of computed indicator series. One entry per
/// (symbol, metric, window); the whole series is computed on first
/// request and indexed thereafter.
#[derive(Default)]
pub struct IndicatorCache {
    map: HashMap<CacheKey, Vec<f64>>,
}

impl IndicatorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct series computed so far.
    pub fn series_count(&self) -> usize {
        self.map.len()
    }

    /// The full series, computing and caching it on first request.
    /// `None` when the symbol is not in the database.
    pub fn series(
        &mut self,
        db: &PriceDb,
        symbol: &str,
        metric: Metric,
        window: usize,
    ) -> Option<&[f64]> {
        let key = CacheKey {
            symbol: symbol.to_string(),
            metric,
            window,
        };
        if !self.map.contains_key(&key) {
            let series = db.series(symbol)?;
            self.map.insert(key.clone(), metric.compute(series, window));
        }
        self.map.get(&key).map(Vec::as_slice)
    }

    /// The value at one axis index. `None` for unknown symbols, out of
    /// range indexes, and NaN sentinels, so "unavailable" never leaks
    /// through as a number.
    pub fn value(
        &mut self,
        db: &PriceDb,
        symbol: &str,
        metric: Metric,
        window: usize,
        index: usize,
    ) -> Option<f64> {
        self.series(db, symbol, metric, window)?
            .get(index)
            .copied()
            .filter(|v| v.is_finite())
    }
}

fn shift_back(values: &[f64]) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    for i in 1..values.len() {
        out[i] = values[i - 1];
    }
    out
}

fn rolling_extreme(
    values: &[f64],
    period: usize,
    pick: fn(f64, f64) -> f64,
    init: f64,
) -> Vec<f64> {
    let n = values.len();
    let mut out = vec![f64::NAN; n];
    if period == 0 || n < period {
        return out;
    }
    for i in (period - 1)..n {
        let window = &values[i + 1 - period..=i];
        if window.iter().any(|v| v.is_nan()) {
            continue;
        }
        out[i] = window.iter().cloned().fold(init, pick);
    }
    out
}

#[cfg(test)]
pub(crate) const DEFAULT_EPSILON: f64 = 1e-10;

#[cfg(test)]
pub(crate) fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() <= epsilon,
        "expected {expected}, got {actual} (eps {epsilon})"
    );
}

#[cfg(test)]
pub(crate) fn make_series(closes: &[f64]) -> TickerSeries {
    TickerSeries {
        open: closes.iter().map(|c| c - 0.5).collect(),
        high: closes.iter().map(|c| c + 1.0).collect(),
        low: closes.iter().map(|c| c - 1.0).collect(),
        close: closes.to_vec(),
        adj_close: closes.to_vec(),
        adj_open: closes.iter().map(|c| c - 0.5).collect(),
        volume: vec![1_000_000.0; closes.len()],
        first_valid: if closes.is_empty() { None } else { Some(0) },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet};

    use chrono::NaiveDate;

    use crate::data::RawBar;

    fn tiny_db() -> PriceDb {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let bars: Vec<RawBar> = (0..30)
            .map(|i| {
                let px = 100.0 + i as f64;
                RawBar {
                    date: start + chrono::Days::new(i),
                    open: px - 0.5,
                    high: px + 1.0,
                    low: px - 1.0,
                    close: px,
                    adj_close: px,
                    volume: 1_000_000.0,
                }
            })
            .collect();
        let mut map = BTreeMap::new();
        map.insert("AAA".to_string(), bars);
        let indicators: BTreeSet<String> = ["AAA".to_string()].into();
        PriceDb::build(&map, &indicators).unwrap()
    }

    #[test]
    fn serde_names_are_screaming_snake() {
        let json = serde_json::to_string(&Metric::MacdLine).unwrap();
        assert_eq!(json, "\"MACD_LINE\"");
        let back: Metric = serde_json::from_str("\"CHAIKIN_MONEY_FLOW\"").unwrap();
        assert_eq!(back, Metric::ChaikinMoneyFlow);
        let back: Metric = serde_json::from_str("\"R_SQUARED\"").unwrap();
        assert_eq!(back, Metric::RSquared);
    }

    #[test]
    fn all_metrics_listed_once() {
        let mut seen = std::collections::HashSet::new();
        for m in Metric::ALL {
            assert!(seen.insert(m), "{m:?} listed twice");
        }
        assert_eq!(seen.len(), 48);
    }

    #[test]
    fn min_history_matches_first_defined_index() {
        // For every metric, the value at index min_history-1 must be
        // defined on a clean series and the one before must not be.
        let closes: Vec<f64> = (0..120).map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0).collect();
        let s = make_series(&closes);
        let w = 10;
        for m in Metric::ALL {
            let out = m.compute(&s, w);
            let need = m.min_history(w);
            assert!(
                out[need - 1].is_finite(),
                "{m:?}: index {} should be defined",
                need - 1
            );
            if need > 1 {
                assert!(
                    out[need - 2].is_nan(),
                    "{m:?}: index {} should still be NaN",
                    need - 2
                );
            }
        }
    }

    #[test]
    fn previous_close_shifts_by_one() {
        let s = make_series(&[10.0, 11.0, 12.0]);
        let out = Metric::PreviousClose.compute(&s, 1);
        assert!(out[0].is_nan());
        assert_approx(out[1], 10.0, DEFAULT_EPSILON);
        assert_approx(out[2], 11.0, DEFAULT_EPSILON);
    }

    #[test]
    fn highest_lowest_close_window() {
        let s = make_series(&[5.0, 9.0, 7.0, 3.0]);
        let hi = Metric::HighestClose.compute(&s, 3);
        let lo = Metric::LowestClose.compute(&s, 3);
        assert_approx(hi[2], 9.0, DEFAULT_EPSILON);
        assert_approx(hi[3], 9.0, DEFAULT_EPSILON);
        assert_approx(lo[3], 3.0, DEFAULT_EPSILON);
    }

    #[test]
    fn cache_computes_each_series_once() {
        let db = tiny_db();
        let mut cache = IndicatorCache::new();
        let a = cache.value(&db, "AAA", Metric::Sma, 5, 10).unwrap();
        let b = cache.value(&db, "AAA", Metric::Sma, 5, 11).unwrap();
        assert_eq!(cache.series_count(), 1);
        assert!(b > a, "rising series should have a rising SMA");
        cache.value(&db, "AAA", Metric::Sma, 10, 15).unwrap();
        assert_eq!(cache.series_count(), 2, "different window is a new entry");
    }

    #[test]
    fn cache_value_hides_warmup_and_unknowns() {
        let db = tiny_db();
        let mut cache = IndicatorCache::new();
        assert_eq!(cache.value(&db, "AAA", Metric::Sma, 5, 2), None);
        assert_eq!(cache.value(&db, "ZZZ", Metric::Sma, 5, 10), None);
        assert_eq!(cache.value(&db, "AAA", Metric::Sma, 5, 999), None);
    }
}
