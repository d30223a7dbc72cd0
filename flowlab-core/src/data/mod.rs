//! Market data: the bar-source port, CSV files, synthetic fixtures, and
//! the aligned price database.

pub mod csv_source;
pub mod pricedb;
pub mod provider;
pub mod synthetic;

pub use csv_source::CsvBarSource;
pub use pricedb::{PriceDb, PriceField, TickerSeries};
pub use provider::{BarSource, DataError, InMemoryBars, RawBar};
