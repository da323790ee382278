//! Price bars and their named fields.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset};

use crate::domain::error::LookbackError;

/// One aggregated price sample ending at `ending`.
///
/// Sequences of bars are ordered ascending by `ending` with no duplicates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bar {
    pub ending: DateTime<FixedOffset>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl Bar {
    pub fn field(&self, field: Field) -> f64 {
        match field {
            Field::Open => self.open,
            Field::High => self.high,
            Field::Low => self.low,
            Field::Close => self.close,
            Field::Volume => self.volume as f64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Open,
    High,
    Low,
    Close,
    Volume,
}

impl Field {
    pub const ALL: [Field; 5] = [
        Field::Open,
        Field::High,
        Field::Low,
        Field::Close,
        Field::Volume,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Field::Open => "open",
            Field::High => "high",
            Field::Low => "low",
            Field::Close => "close",
            Field::Volume => "volume",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Field {
    type Err = LookbackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        Field::ALL
            .into_iter()
            .find(|f| f.name() == name)
            .ok_or(LookbackError::UnknownField { name })
    }
}

/// Rejects sequences that are not strictly ascending by `ending`.
pub fn check_ordered(bars: &[Bar]) -> Result<(), LookbackError> {
    for pair in bars.windows(2) {
        if pair[1].ending <= pair[0].ending {
            let reason = if pair[1].ending == pair[0].ending {
                format!("duplicate ending {}", pair[1].ending.to_rfc3339())
            } else {
                format!(
                    "ending {} precedes {}",
                    pair[1].ending.to_rfc3339(),
                    pair[0].ending.to_rfc3339()
                )
            };
            return Err(LookbackError::Data { reason });
        }
    }
    Ok(())
}
