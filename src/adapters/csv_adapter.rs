//! CSV bar input and value series output.
//!
//! Bar files carry a header row followed by
//! `ending,open,high,low,close,volume` records, where `ending` is ISO-8601
//! with a fixed offset.

use crate::domain::bar::{Bar, check_ordered};
use crate::domain::error::LookbackError;
use crate::ports::bar_port::BarPort;
use chrono::{DateTime, FixedOffset};
use std::fmt::Display;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;

pub struct CsvBarAdapter {
    path: PathBuf,
}

impl CsvBarAdapter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl BarPort for CsvBarAdapter {
    fn load_bars(&self) -> Result<Vec<Bar>, LookbackError> {
        let content = fs::read_to_string(&self.path).map_err(|e| LookbackError::Data {
            reason: format!("failed to read {}: {}", self.path.display(), e),
        })?;
        let bars = parse_bars(&content)?;
        tracing::debug!(path = %self.path.display(), count = bars.len(), "loaded bars");
        Ok(bars)
    }
}

/// Parses bar records, sorting them ascending by `ending`.
pub fn parse_bars(content: &str) -> Result<Vec<Bar>, LookbackError> {
    let mut rdr = csv::Reader::from_reader(content.as_bytes());
    let mut bars = Vec::new();

    for (line, result) in rdr.records().enumerate() {
        let record = result.map_err(|e| LookbackError::Data {
            reason: format!("CSV parse error: {}", e),
        })?;
        let row = line + 2;

        let ending = record.get(0).ok_or_else(|| LookbackError::Data {
            reason: format!("row {row}: missing ending column"),
        })?;
        let ending = DateTime::parse_from_rfc3339(ending.trim()).map_err(|e| LookbackError::Data {
            reason: format!("row {row}: invalid ending {ending:?}: {e}"),
        })?;

        bars.push(Bar {
            ending,
            open: column(&record, 1, "open", row)?,
            high: column(&record, 2, "high", row)?,
            low: column(&record, 3, "low", row)?,
            close: column(&record, 4, "close", row)?,
            volume: column(&record, 5, "volume", row)?,
        });
    }

    bars.sort_by_key(|b| b.ending);
    check_ordered(&bars)?;
    Ok(bars)
}

fn column<T>(record: &csv::StringRecord, idx: usize, name: &str, row: usize) -> Result<T, LookbackError>
where
    T: FromStr,
    T::Err: Display,
{
    record
        .get(idx)
        .ok_or_else(|| LookbackError::Data {
            reason: format!("row {row}: missing {name} column"),
        })?
        .trim()
        .parse()
        .map_err(|e| LookbackError::Data {
            reason: format!("row {row}: invalid {name} value: {e}"),
        })
}

/// Writes `ending,value` rows. Undefined values are left empty.
pub fn write_series<W: Write>(
    writer: W,
    rows: &[(DateTime<FixedOffset>, f64)],
) -> Result<(), LookbackError> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(["ending", "value"])
        .map_err(std::io::Error::from)?;
    for (ending, value) in rows {
        let value = if value.is_nan() {
            String::new()
        } else {
            value.to_string()
        };
        wtr.write_record([ending.to_rfc3339(), value])
            .map_err(std::io::Error::from)?;
    }
    wtr.flush()?;
    Ok(())
}
