//! Day and longer intervals.
//!
//! Boundaries are local midnights in the exchange timezone. `day` counts
//! Monday–Friday only; `week` starts on Monday; `month`, `quarter` and
//! `year` start on the first day of their calendar unit.

use chrono::{DateTime, Datelike, Days, Months, NaiveDate};
use chrono_tz::Tz;
use tracing::debug;

use crate::domain::error::LookbackError;
use crate::domain::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum CalendarUnit {
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl CalendarUnit {
    fn name(self) -> &'static str {
        match self {
            CalendarUnit::Day => "day",
            CalendarUnit::Week => "week",
            CalendarUnit::Month => "month",
            CalendarUnit::Quarter => "quarter",
            CalendarUnit::Year => "year",
        }
    }

    /// Calendar months per unit, for the month-based units.
    fn months(self) -> Option<u32> {
        match self {
            CalendarUnit::Month => Some(1),
            CalendarUnit::Quarter => Some(3),
            CalendarUnit::Year => Some(12),
            CalendarUnit::Day | CalendarUnit::Week => None,
        }
    }

    fn floor_date(self, date: NaiveDate) -> Result<NaiveDate, LookbackError> {
        let weekday = weekday(date);
        match self.months() {
            None if self == CalendarUnit::Day && weekday > 5 => {
                debug!(%date, "day floor on a weekend; using Friday");
                back(date, weekday - 5, self)
            }
            None if self == CalendarUnit::Day => Ok(date),
            None => back(date, weekday - 1, self),
            Some(k) => {
                let month = (date.month0() / k) * k + 1;
                NaiveDate::from_ymd_opt(date.year(), month, 1).ok_or_else(|| out_of_range(self))
            }
        }
    }

    fn ceil_date(self, session: &Session, t: &DateTime<Tz>) -> Result<NaiveDate, LookbackError> {
        let mut date = t.date_naive();
        if session.midnight(date)? < *t {
            date = forward(date, 1, self)?;
        }
        let floor = self.floor_date(date)?;
        if floor == date {
            Ok(date)
        } else {
            if self == CalendarUnit::Day {
                debug!(%date, "day ceil on a weekend; using Monday");
            }
            self.step_forward(floor, 1)
        }
    }

    /// Moves an aligned date forward `n` units.
    fn step_forward(self, date: NaiveDate, n: i64) -> Result<NaiveDate, LookbackError> {
        match self.months() {
            Some(k) => date
                .checked_add_months(Months::new(month_count(self, n, k)?))
                .ok_or_else(|| out_of_range(self)),
            None if self == CalendarUnit::Week => forward(date, weeks_to_days(self, n)?, self),
            None => {
                let mut date = forward(date, weeks_to_days(self, n / 5)?, self)?;
                for _ in 0..n % 5 {
                    date = forward(date, 1, self)?;
                    while weekday(date) > 5 {
                        date = forward(date, 1, self)?;
                    }
                }
                Ok(date)
            }
        }
    }

    /// Moves an aligned date back `n` units.
    fn step_back(self, date: NaiveDate, n: i64) -> Result<NaiveDate, LookbackError> {
        match self.months() {
            Some(k) => date
                .checked_sub_months(Months::new(month_count(self, n, k)?))
                .ok_or_else(|| out_of_range(self)),
            None if self == CalendarUnit::Week => back(date, weeks_to_days(self, n)?, self),
            None => {
                let mut date = back(date, weeks_to_days(self, n / 5)?, self)?;
                for _ in 0..n % 5 {
                    date = back(date, 1, self)?;
                    while weekday(date) > 5 {
                        date = back(date, 1, self)?;
                    }
                }
                Ok(date)
            }
        }
    }

    pub(super) fn floor(
        self,
        session: &Session,
        t: &DateTime<Tz>,
    ) -> Result<DateTime<Tz>, LookbackError> {
        session.midnight(self.floor_date(t.date_naive())?)
    }

    pub(super) fn ceil(
        self,
        session: &Session,
        t: &DateTime<Tz>,
    ) -> Result<DateTime<Tz>, LookbackError> {
        session.midnight(self.ceil_date(session, t)?)
    }

    pub(super) fn inc(
        self,
        session: &Session,
        t: &DateTime<Tz>,
        amount: i64,
    ) -> Result<DateTime<Tz>, LookbackError> {
        let start = self.ceil_date(session, t)?;
        session.midnight(self.step_forward(start, amount)?)
    }

    pub(super) fn dec(
        self,
        session: &Session,
        t: &DateTime<Tz>,
        amount: i64,
    ) -> Result<DateTime<Tz>, LookbackError> {
        let start = self.floor_date(t.date_naive())?;
        session.midnight(self.step_back(start, amount)?)
    }

    pub(super) fn diff(
        self,
        session: &Session,
        to: &DateTime<Tz>,
        from: &DateTime<Tz>,
    ) -> Result<i64, LookbackError> {
        if to < from {
            return Ok(-self.diff(session, from, to)?);
        }
        match self {
            CalendarUnit::Month | CalendarUnit::Year => {
                let k = i64::from(self.months().unwrap_or(1));
                Ok(whole_months(to, from) / k)
            }
            CalendarUnit::Day | CalendarUnit::Week | CalendarUnit::Quarter => {
                let start = self.ceil_date(session, from)?;
                let end = self.floor_date(to.date_naive())?;
                if end < start {
                    return Ok(0);
                }
                Ok(match self {
                    CalendarUnit::Day => weekdays_after(start, end),
                    CalendarUnit::Week => (end - start).num_days() / 7,
                    _ => month_index(end) / 3 - month_index(start) / 3,
                })
            }
        }
    }
}

/// ISO weekday, Monday = 1.
fn weekday(date: NaiveDate) -> i64 {
    i64::from(date.weekday().number_from_monday())
}

fn month_index(date: NaiveDate) -> i64 {
    i64::from(date.year()) * 12 + i64::from(date.month0())
}

/// Whole calendar months from `earlier` to `later` by local wall clock.
fn whole_months(later: &DateTime<Tz>, earlier: &DateTime<Tz>) -> i64 {
    let (l, e) = (later.naive_local(), earlier.naive_local());
    let months = (i64::from(l.year()) - i64::from(e.year())) * 12 + i64::from(l.month())
        - i64::from(e.month());
    if (l.day(), l.time()) < (e.day(), e.time()) {
        months - 1
    } else {
        months
    }
}

/// Weekdays in `(start, end]`.
fn weekdays_after(start: NaiveDate, end: NaiveDate) -> i64 {
    let days = (end - start).num_days();
    let mut count = days / 7 * 5;
    let mut cursor = start + chrono::Duration::days(days / 7 * 7);
    while cursor < end {
        cursor = cursor + chrono::Duration::days(1);
        if weekday(cursor) <= 5 {
            count += 1;
        }
    }
    count
}

fn forward(date: NaiveDate, days: i64, unit: CalendarUnit) -> Result<NaiveDate, LookbackError> {
    let days = u64::try_from(days).map_err(|_| out_of_range(unit))?;
    date.checked_add_days(Days::new(days))
        .ok_or_else(|| out_of_range(unit))
}

fn back(date: NaiveDate, days: i64, unit: CalendarUnit) -> Result<NaiveDate, LookbackError> {
    let days = u64::try_from(days).map_err(|_| out_of_range(unit))?;
    date.checked_sub_days(Days::new(days))
        .ok_or_else(|| out_of_range(unit))
}

fn weeks_to_days(unit: CalendarUnit, weeks: i64) -> Result<i64, LookbackError> {
    weeks.checked_mul(7).ok_or_else(|| out_of_range(unit))
}

fn month_count(unit: CalendarUnit, n: i64, k: u32) -> Result<u32, LookbackError> {
    n.checked_mul(i64::from(k))
        .and_then(|m| u32::try_from(m).ok())
        .ok_or_else(|| out_of_range(unit))
}

fn out_of_range(unit: CalendarUnit) -> LookbackError {
    LookbackError::invalid_argument(unit.name(), "date arithmetic left the supported range")
}
