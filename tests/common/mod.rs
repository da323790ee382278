#![allow(dead_code)]

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime};
use chrono_tz::Tz;
use lookback::domain::bar::Bar;
use lookback::domain::error::LookbackError;
use lookback::domain::session::Session;
use lookback::ports::bar_port::BarPort;
use std::io::Write;

pub struct MockBarPort {
    pub bars: Vec<Bar>,
}

impl BarPort for MockBarPort {
    fn load_bars(&self) -> Result<Vec<Bar>, LookbackError> {
        Ok(self.bars.clone())
    }
}

pub fn new_york(interval: &str) -> Session {
    Session::new(interval, "09:30", "16:00", "America/New_York").unwrap()
}

pub fn local(session: &Session, y: i32, m: u32, d: u32, hh: u32, mm: u32) -> DateTime<Tz> {
    session
        .at(
            NaiveDate::from_ymd_opt(y, m, d).unwrap(),
            NaiveTime::from_hms_opt(hh, mm, 0).unwrap(),
        )
        .unwrap()
}

pub fn ending(value: &str) -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339(value).unwrap()
}

/// One-minute bars from `start`, with high/low one point either side.
pub fn make_bars(start: &str, prices: &[f64]) -> Vec<Bar> {
    let start = ending(start);
    prices
        .iter()
        .enumerate()
        .map(|(i, &p)| Bar {
            ending: start + Duration::minutes(i as i64),
            open: p,
            high: p + 1.0,
            low: p - 1.0,
            close: p,
            volume: 1000,
        })
        .collect()
}

/// Bars ending at the given local clock readings of consecutive days from
/// `first`, skipping weekends; close encodes `day * 100 + hour`.
pub fn session_bars(session: &Session, first: NaiveDate, days: usize, hours: &[u32]) -> Vec<Bar> {
    let mut bars = Vec::new();
    let mut date = first;
    let mut taken = 0;
    while taken < days {
        if chrono::Datelike::weekday(&date).number_from_monday() <= 5 {
            for &h in hours {
                let t = session
                    .at(date, NaiveTime::from_hms_opt(h, 0, 0).unwrap())
                    .unwrap()
                    .fixed_offset();
                let close = f64::from(chrono::Datelike::day(&date) * 100 + h);
                bars.push(Bar {
                    ending: t,
                    open: close,
                    high: close,
                    low: close,
                    close,
                    volume: 100,
                });
            }
            taken += 1;
        }
        date = date.succ_opt().unwrap();
    }
    bars
}

pub fn write_temp(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

pub const NEW_YORK_INI: &str = "[session]
interval = m1
market_opens_at = 09:30
market_closes_at = 16:00
tz = America/New_York
";
