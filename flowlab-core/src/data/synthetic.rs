//! Deterministic synthetic OHLCV series for demos and fixtures.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::data::provider::RawBar;

/// Derive a stable per-symbol seed so different symbols produce
/// different but reproducible walks.
pub fn seed_for(symbol: &str) -> u64 {
    let hash = blake3::hash(symbol.as_bytes());
    u64::from_le_bytes(hash.as_bytes()[..8].try_into().unwrap())
}

/// Generate `days` weekday bars starting at `start` as a geometric walk.
///
/// `drift` and `daily_vol` are per-day fractional parameters; prices stay
/// strictly positive.
pub fn synthetic_bars(
    seed: u64,
    days: usize,
    start: NaiveDate,
    start_price: f64,
    drift: f64,
    daily_vol: f64,
) -> Vec<RawBar> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut bars = Vec::with_capacity(days);
    let mut date = next_weekday(start);
    let mut close = start_price.max(0.01);

    for _ in 0..days {
        let open = close;
        let shock: f64 = rng.gen_range(-1.0..1.0);
        let ret = drift + daily_vol * shock;
        close = (open * (1.0 + ret)).max(0.01);

        let span = (open.max(close) - open.min(close)).max(open * 0.001);
        let high = open.max(close) + span * rng.gen_range(0.0..0.5);
        let low = (open.min(close) - span * rng.gen_range(0.0..0.5)).max(0.01);
        let volume = (1_000_000.0 * rng.gen_range(0.5_f64..1.5)).round();

        bars.push(RawBar {
            date,
            open,
            high,
            low,
            close,
            adj_close: close,
            volume,
        });
        date = next_weekday(date + Duration::days(1));
    }
    bars
}

fn next_weekday(mut date: NaiveDate) -> NaiveDate {
    while matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
        date += Duration::days(1);
    }
    date
}
