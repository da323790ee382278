//! Exchange session configuration.
//!
//! A [`Session`] is built once per evaluation context and never mutated. It
//! carries the operative interval, the regular and extended trading hours as
//! local clock times, and the exchange timezone. Every calendar operation
//! receives the session explicitly.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use chrono_tz::Tz;

use crate::domain::error::LookbackError;
use crate::domain::interval::Interval;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Session {
    interval: Interval,
    market_opens_at: NaiveTime,
    market_closes_at: NaiveTime,
    premarket_opens_at: NaiveTime,
    after_hours_closes_at: NaiveTime,
    tz: Tz,
}

impl Session {
    /// Builds a session with regular hours only; the extended hours default
    /// to the regular open and close.
    pub fn new(
        interval: &str,
        market_opens_at: &str,
        market_closes_at: &str,
        tz: &str,
    ) -> Result<Self, LookbackError> {
        let interval: Interval = interval.parse()?;
        let market_opens_at = parse_clock("marketOpensAt", market_opens_at)?;
        let market_closes_at = parse_clock("marketClosesAt", market_closes_at)?;
        let tz = parse_tz(tz)?;
        Ok(Self {
            interval,
            market_opens_at,
            market_closes_at,
            premarket_opens_at: market_opens_at,
            after_hours_closes_at: market_closes_at,
            tz,
        })
    }

    pub fn with_extended_hours(
        self,
        premarket_opens_at: &str,
        after_hours_closes_at: &str,
    ) -> Result<Self, LookbackError> {
        Ok(Self {
            premarket_opens_at: parse_clock("premarketOpensAt", premarket_opens_at)?,
            after_hours_closes_at: parse_clock("afterHoursClosesAt", after_hours_closes_at)?,
            ..self
        })
    }

    /// The same exchange hours measured at a different granularity.
    pub fn with_interval(&self, interval: Interval) -> Self {
        Self { interval, ..*self }
    }

    pub fn interval(&self) -> Interval {
        self.interval
    }

    pub fn market_opens_at(&self) -> NaiveTime {
        self.market_opens_at
    }

    pub fn market_closes_at(&self) -> NaiveTime {
        self.market_closes_at
    }

    pub fn premarket_opens_at(&self) -> NaiveTime {
        self.premarket_opens_at
    }

    pub fn after_hours_closes_at(&self) -> NaiveTime {
        self.after_hours_closes_at
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    /// The instant expressed in the exchange timezone.
    pub fn local<Z: TimeZone>(&self, t: &DateTime<Z>) -> DateTime<Tz> {
        t.with_timezone(&self.tz)
    }

    /// Resolves a local wall-clock reading. Ambiguous readings take the
    /// earlier instant; readings inside a DST gap move forward one hour.
    pub fn resolve(&self, naive: NaiveDateTime) -> Result<DateTime<Tz>, LookbackError> {
        self.tz
            .from_local_datetime(&naive)
            .earliest()
            .or_else(|| {
                let later = naive.checked_add_signed(Duration::hours(1))?;
                self.tz.from_local_datetime(&later).earliest()
            })
            .ok_or_else(|| {
                LookbackError::invalid_session(format!(
                    "local time {naive} does not exist in {}",
                    self.tz.name()
                ))
            })
    }

    pub fn at(&self, date: NaiveDate, time: NaiveTime) -> Result<DateTime<Tz>, LookbackError> {
        self.resolve(date.and_time(time))
    }

    pub fn opens_on(&self, date: NaiveDate) -> Result<DateTime<Tz>, LookbackError> {
        self.at(date, self.market_opens_at)
    }

    pub fn closes_on(&self, date: NaiveDate) -> Result<DateTime<Tz>, LookbackError> {
        self.at(date, self.market_closes_at)
    }

    pub fn midnight(&self, date: NaiveDate) -> Result<DateTime<Tz>, LookbackError> {
        self.at(date, NaiveTime::MIN)
    }

    /// Moves a whole number of calendar days keeping the local clock reading.
    pub fn shift_days(&self, t: &DateTime<Tz>, days: i64) -> Result<DateTime<Tz>, LookbackError> {
        let shifted = Duration::try_days(days)
            .and_then(|offset| t.naive_local().checked_add_signed(offset))
            .ok_or_else(|| {
                LookbackError::invalid_argument(
                    "shift_days",
                    format!("{days} days from {t} is out of range"),
                )
            })?;
        self.resolve(shifted)
    }
}

/// Parses an `HH:mm` or `HH:mm:ss` clock reading.
pub fn parse_clock(field: &str, value: &str) -> Result<NaiveTime, LookbackError> {
    let value = value.trim();
    let well_formed = matches!(value.len(), 5 | 8)
        && value.bytes().enumerate().all(|(i, b)| {
            if i % 3 == 2 {
                b == b':'
            } else {
                b.is_ascii_digit()
            }
        });
    let parsed = if !well_formed {
        None
    } else if value.len() == 5 {
        NaiveTime::parse_from_str(value, "%H:%M").ok()
    } else {
        NaiveTime::parse_from_str(value, "%H:%M:%S").ok()
    };
    parsed.ok_or_else(|| {
        LookbackError::invalid_session(format!("{field} must be HH:mm[:ss], not {value:?}"))
    })
}

pub fn parse_tz(value: &str) -> Result<Tz, LookbackError> {
    value
        .trim()
        .parse::<Tz>()
        .map_err(|e| LookbackError::invalid_session(format!("unrecognized timezone {value:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn new_york() -> Session {
        Session::new("m1", "09:30", "16:00", "America/New_York").unwrap()
    }

    #[test]
    fn new_defaults_extended_hours_to_regular() {
        let session = new_york();
        assert_eq!(session.interval(), Interval::M1);
        assert_eq!(session.premarket_opens_at(), session.market_opens_at());
        assert_eq!(session.after_hours_closes_at(), session.market_closes_at());
    }

    #[test]
    fn extended_hours_are_parsed() {
        let session = new_york().with_extended_hours("04:00", "20:00:00").unwrap();
        assert_eq!(session.premarket_opens_at().hour(), 4);
        assert_eq!(session.after_hours_closes_at().hour(), 20);
    }

    #[test]
    fn clock_accepts_seconds() {
        let t = parse_clock("marketOpensAt", "09:30:15").unwrap();
        assert_eq!((t.hour(), t.minute(), t.second()), (9, 30, 15));
    }

    #[test]
    fn malformed_clock_is_invalid_session() {
        for bad in ["9:30", "0930", "09:30pm", "", "25:00", "09:61"] {
            let err = Session::new("m1", bad, "16:00", "America/New_York").unwrap_err();
            assert!(
                matches!(err, LookbackError::InvalidSession { .. }),
                "{bad:?} gave {err}"
            );
        }
    }

    #[test]
    fn unknown_timezone_is_invalid_session() {
        let err = Session::new("m1", "09:30", "16:00", "Mars/Olympus").unwrap_err();
        assert!(matches!(err, LookbackError::InvalidSession { .. }));
    }

    #[test]
    fn unknown_interval_is_reported() {
        let err = Session::new("m3", "09:30", "16:00", "America/New_York").unwrap_err();
        assert!(matches!(err, LookbackError::UnknownInterval { .. }));
    }

    #[test]
    fn with_interval_keeps_hours() {
        let session = new_york();
        let day = session.with_interval(Interval::Day);
        assert_eq!(day.interval(), Interval::Day);
        assert_eq!(day.market_closes_at(), session.market_closes_at());
        assert_eq!(day.tz(), session.tz());
    }

    #[test]
    fn opens_on_uses_local_clock() {
        let session = new_york();
        let date = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
        let opens = session.opens_on(date).unwrap();
        assert_eq!(opens.to_rfc3339(), "2024-07-01T09:30:00-04:00");
        let winter = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert_eq!(
            session.closes_on(winter).unwrap().to_rfc3339(),
            "2024-01-02T16:00:00-05:00"
        );
    }

    #[test]
    fn resolve_moves_out_of_dst_gap() {
        let session = new_york();
        let gap = NaiveDate::from_ymd_opt(2024, 3, 10)
            .unwrap()
            .and_hms_opt(2, 30, 0)
            .unwrap();
        let resolved = session.resolve(gap).unwrap();
        assert_eq!(resolved.to_rfc3339(), "2024-03-10T03:30:00-04:00");
    }

    #[test]
    fn shift_days_keeps_wall_clock_across_dst() {
        let session = new_york();
        let before = session
            .at(
                NaiveDate::from_ymd_opt(2024, 3, 8).unwrap(),
                NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            )
            .unwrap();
        let after = session.shift_days(&before, 3).unwrap();
        assert_eq!(after.to_rfc3339(), "2024-03-11T09:30:00-04:00");
    }

    #[test]
    fn shift_days_out_of_range_is_an_error() {
        let session = new_york();
        let t = session
            .at(
                NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
                NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            )
            .unwrap();
        for days in [i64::MAX / 2, 7 * 512_820_512_820_512, -(1 << 40)] {
            assert!(
                matches!(
                    session.shift_days(&t, days),
                    Err(LookbackError::InvalidArgument { .. })
                ),
                "{days}"
            );
        }
    }
}
