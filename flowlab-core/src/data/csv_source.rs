//! Directory-of-CSV bar source: one `SYMBOL.csv` file per ticker.
//!
//! Layout: header `date,open,high,low,close,adj_close,volume`, one row
//! per trading day. Rows may arrive in any order; they are sorted by
//! date after parsing.

use std::io;
use std::path::PathBuf;

use crate::data::provider::{BarSource, DataError, RawBar};

#[derive(Debug, Clone)]
pub struct CsvBarSource {
    dir: PathBuf,
}

impl CsvBarSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }
}

impl BarSource for CsvBarSource {
    fn name(&self) -> &str {
        "csv"
    }

    fn fetch(&self, symbol: &str, max_rows: usize) -> Result<Vec<RawBar>, DataError> {
        let path = self.dir.join(format!("{symbol}.csv"));
        let file = match std::fs::File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(DataError::NoData(symbol.to_string()));
            }
            Err(e) => return Err(DataError::Io(e)),
        };
        let mut bars = read_bars(file)?;
        bars.sort_by_key(|b| b.date);
        let skip = bars.len().saturating_sub(max_rows);
        Ok(bars.split_off(skip))
    }
}

/// Parse bars from any CSV reader with the standard header.
pub fn read_bars<R: io::Read>(reader: R) -> Result<Vec<RawBar>, DataError> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut bars = Vec::new();
    for record in rdr.deserialize::<RawBar>() {
        bars.push(record.map_err(|e| DataError::Malformed(e.to_string()))?);
    }
    Ok(bars)
}

/// Write bars as CSV with the standard header.
pub fn write_bars<W: io::Write>(writer: W, bars: &[RawBar]) -> Result<(), DataError> {
    let mut wtr = csv::Writer::from_writer(writer);
    for bar in bars {
        wtr.serialize(bar)
            .map_err(|e| DataError::Malformed(e.to_string()))?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
date,open,high,low,close,adj_close,volume
2024-01-03,101.0,103.0,100.0,102.0,102.0,1200
2024-01-02,100.0,102.0,99.0,101.0,101.0,1000
";

    #[test]
    fn read_bars_parses_rows() {
        let bars = read_bars(SAMPLE.as_bytes()).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].date.to_string(), "2024-01-03");
        assert_eq!(bars[1].open, 100.0);
        assert_eq!(bars[1].volume, 1000.0);
    }

    #[test]
    fn read_bars_rejects_malformed_rows() {
        let bad = "date,open,high,low,close,adj_close,volume\n2024-01-02,oops,1,1,1,1,1\n";
        let err = read_bars(bad.as_bytes()).unwrap_err();
        assert!(matches!(err, DataError::Malformed(_)));
    }

    #[test]
    fn write_then_read_roundtrips() {
        let bars = read_bars(SAMPLE.as_bytes()).unwrap();
        let mut buf = Vec::new();
        write_bars(&mut buf, &bars).unwrap();
        let again = read_bars(buf.as_slice()).unwrap();
        assert_eq!(bars, again);
    }

    #[test]
    fn fetch_truncates_to_newest_after_sorting() {
        let dir = std::env::temp_dir().join(format!("flowlab-csv-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("TST.csv"), SAMPLE).unwrap();

        let source = CsvBarSource::new(&dir);
        let bars = source.fetch("TST", 1).unwrap();
        assert_eq!(bars.len(), 1);
        // Newest row wins even though it appears first in the file.
        assert_eq!(bars[0].date.to_string(), "2024-01-03");

        assert!(matches!(
            source.fetch("NOPE", 10).unwrap_err(),
            DataError::NoData(_)
        ));
        std::fs::remove_dir_all(&dir).ok();
    }
}
