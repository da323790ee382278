//! Trading-calendar intervals.
//!
//! The interval set is closed and totally ordered by nominal length. Every
//! interval exposes the same five operations against a [`Session`]:
//!
//! - `floor(t)`: latest valid boundary at or before `t`
//! - `ceil(t)`: earliest valid boundary at or after `t`
//! - `inc(t, n)` / `dec(t, n)`: walk `n` whole units forward / backward
//! - `diff(to, from)`: signed unit count, the inverse of `inc`
//!
//! Intraday intervals ([`intraday`]) honour the session's open and close on
//! Monday–Friday: their `floor` and `ceil` are the zero-length `dec` and `inc`
//! kept within `[open, close)`, so a boundary never lands on a weekend or
//! outside trading hours. `day` and longer ([`calendar`]) work on whole
//! trading days and calendar units.

mod calendar;
mod intraday;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, TimeZone};
use chrono_tz::Tz;

use crate::domain::error::LookbackError;
use crate::domain::session::Session;

use calendar::CalendarUnit;
use intraday::Grid;

const MINUTE_MILLIS: i64 = 60 * 1000;
const DAY_MILLIS: i64 = 24 * 60 * MINUTE_MILLIS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Interval {
    M1,
    M2,
    M5,
    M10,
    M15,
    M20,
    M30,
    M60,
    M120,
    M240,
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

/// How an interval finds its boundaries.
#[derive(Debug, Clone, Copy)]
enum Strategy {
    /// k-minute buckets on the epoch grid, walked by the 1-minute unit.
    Minutes(i64),
    /// Hour buckets on the exchange's local clock, walked in their own units.
    Hours(i64),
    Calendar(CalendarUnit),
}

impl Interval {
    pub const ALL: [Interval; 15] = [
        Interval::M1,
        Interval::M2,
        Interval::M5,
        Interval::M10,
        Interval::M15,
        Interval::M20,
        Interval::M30,
        Interval::M60,
        Interval::M120,
        Interval::M240,
        Interval::Day,
        Interval::Week,
        Interval::Month,
        Interval::Quarter,
        Interval::Year,
    ];

    /// Symbolic name, e.g. `m5` or `quarter`.
    pub fn value(self) -> &'static str {
        match self {
            Interval::M1 => "m1",
            Interval::M2 => "m2",
            Interval::M5 => "m5",
            Interval::M10 => "m10",
            Interval::M15 => "m15",
            Interval::M20 => "m20",
            Interval::M30 => "m30",
            Interval::M60 => "m60",
            Interval::M120 => "m120",
            Interval::M240 => "m240",
            Interval::Day => "day",
            Interval::Week => "week",
            Interval::Month => "month",
            Interval::Quarter => "quarter",
            Interval::Year => "year",
        }
    }

    /// Nominal length in milliseconds.
    pub fn millis(self) -> i64 {
        match self.strategy() {
            Strategy::Minutes(k) => k * MINUTE_MILLIS,
            Strategy::Hours(h) => h * 60 * MINUTE_MILLIS,
            Strategy::Calendar(CalendarUnit::Day) => DAY_MILLIS,
            Strategy::Calendar(CalendarUnit::Week) => 7 * DAY_MILLIS,
            Strategy::Calendar(CalendarUnit::Month) => 31 * DAY_MILLIS,
            Strategy::Calendar(CalendarUnit::Quarter) => 3 * 31 * DAY_MILLIS,
            Strategy::Calendar(CalendarUnit::Year) => 365 * DAY_MILLIS,
        }
    }

    pub fn is_intraday(self) -> bool {
        !matches!(self.strategy(), Strategy::Calendar(_))
    }

    fn strategy(self) -> Strategy {
        match self {
            Interval::M1 => Strategy::Minutes(1),
            Interval::M2 => Strategy::Minutes(2),
            Interval::M5 => Strategy::Minutes(5),
            Interval::M10 => Strategy::Minutes(10),
            Interval::M15 => Strategy::Minutes(15),
            Interval::M20 => Strategy::Minutes(20),
            Interval::M30 => Strategy::Minutes(30),
            Interval::M60 => Strategy::Hours(1),
            Interval::M120 => Strategy::Hours(2),
            Interval::M240 => Strategy::Hours(4),
            Interval::Day => Strategy::Calendar(CalendarUnit::Day),
            Interval::Week => Strategy::Calendar(CalendarUnit::Week),
            Interval::Month => Strategy::Calendar(CalendarUnit::Month),
            Interval::Quarter => Strategy::Calendar(CalendarUnit::Quarter),
            Interval::Year => Strategy::Calendar(CalendarUnit::Year),
        }
    }

    /// Latest boundary at or before `t`. Intraday results fall within
    /// `[open, close)`: an instant at or after the close floors to the last
    /// bucket that starts before it.
    pub fn floor(self, session: &Session, t: &DateTime<Tz>) -> Result<DateTime<Tz>, LookbackError> {
        let grid = match self.strategy() {
            Strategy::Minutes(k) => Grid::Minutes(k),
            Strategy::Hours(h) => Grid::Hours(h),
            Strategy::Calendar(unit) => return unit.floor(session, t),
        };
        let floor = snap_floor(grid, session, t)?;
        if floor < session.closes_on(floor.date_naive())? {
            return Ok(floor);
        }
        snap_floor(grid, session, &nudge(&floor, -1)?)
    }

    /// Earliest boundary at or after `t`. Intraday results fall within
    /// `[open, close)`: an instant after the last bucket of a session ceils
    /// to the next open.
    pub fn ceil(self, session: &Session, t: &DateTime<Tz>) -> Result<DateTime<Tz>, LookbackError> {
        let grid = match self.strategy() {
            Strategy::Minutes(k) => Grid::Minutes(k),
            Strategy::Hours(h) => Grid::Hours(h),
            Strategy::Calendar(unit) => return unit.ceil(session, t),
        };
        let ceil = snap_ceil(grid, session, t)?;
        if ceil < session.closes_on(ceil.date_naive())? {
            return Ok(ceil);
        }
        snap_ceil(grid, session, &nudge(&ceil, 1)?)
    }

    pub fn inc(
        self,
        session: &Session,
        t: &DateTime<Tz>,
        amount: i64,
    ) -> Result<DateTime<Tz>, LookbackError> {
        check_amount("inc", amount)?;
        match self.strategy() {
            Strategy::Minutes(k) => {
                let start = Grid::Minutes(k).ceil(t);
                Grid::BASE.inc(session, &start, scale("inc", amount, k)?)
            }
            Strategy::Hours(h) => Grid::Hours(h).inc(session, t, amount),
            Strategy::Calendar(unit) => unit.inc(session, t, amount),
        }
    }

    pub fn dec(
        self,
        session: &Session,
        t: &DateTime<Tz>,
        amount: i64,
    ) -> Result<DateTime<Tz>, LookbackError> {
        check_amount("dec", amount)?;
        match self.strategy() {
            Strategy::Minutes(k) => {
                let start = Grid::Minutes(k).floor(t);
                Grid::BASE.dec(session, &start, scale("dec", amount, k)?)
            }
            Strategy::Hours(h) => Grid::Hours(h).dec(session, t, amount),
            Strategy::Calendar(unit) => unit.dec(session, t, amount),
        }
    }

    pub fn diff(
        self,
        session: &Session,
        to: &DateTime<Tz>,
        from: &DateTime<Tz>,
    ) -> Result<i64, LookbackError> {
        match self.strategy() {
            // Integer division truncates toward zero, which keeps the count
            // consistent with inc for positive spans and dec for negative ones.
            Strategy::Minutes(k) => Ok(Grid::BASE.diff(session, to, from)? / k),
            Strategy::Hours(h) => Grid::Hours(h).diff(session, to, from),
            Strategy::Calendar(unit) => unit.diff(session, to, from),
        }
    }
}

/// Grid floor clamped into the session. Minute grids clamp through the
/// one-minute walk.
fn snap_floor(grid: Grid, session: &Session, t: &DateTime<Tz>) -> Result<DateTime<Tz>, LookbackError> {
    match grid {
        Grid::Minutes(_) => Grid::BASE.dec(session, &grid.floor(t), 0),
        Grid::Hours(_) => grid.dec(session, t, 0),
    }
}

fn snap_ceil(grid: Grid, session: &Session, t: &DateTime<Tz>) -> Result<DateTime<Tz>, LookbackError> {
    match grid {
        Grid::Minutes(_) => Grid::BASE.inc(session, &grid.ceil(t), 0),
        Grid::Hours(_) => grid.inc(session, t, 0),
    }
}

/// Moves `t` by a nanosecond, to step just off a boundary.
fn nudge(t: &DateTime<Tz>, nanos: i64) -> Result<DateTime<Tz>, LookbackError> {
    t.checked_add_signed(Duration::nanoseconds(nanos))
        .ok_or_else(|| LookbackError::invalid_argument("boundary", format!("{t} is out of range")))
}

fn check_amount(context: &str, amount: i64) -> Result<(), LookbackError> {
    if amount < 0 {
        return Err(LookbackError::invalid_argument(
            context,
            format!("amount must be >= 0, not {amount}"),
        ));
    }
    Ok(())
}

fn scale(context: &str, amount: i64, k: i64) -> Result<i64, LookbackError> {
    amount
        .checked_mul(k)
        .ok_or_else(|| LookbackError::invalid_argument(context, format!("amount {amount} is too large")))
}

fn expected_names() -> String {
    Interval::ALL
        .iter()
        .map(|i| i.value())
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.value())
    }
}

impl FromStr for Interval {
    type Err = LookbackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        Interval::ALL
            .iter()
            .copied()
            .find(|i| i.value() == name)
            .ok_or_else(|| LookbackError::UnknownInterval {
                name: name.to_string(),
                expected: expected_names(),
            })
    }
}

/// Orders interval names from shortest to longest, dropping duplicates.
pub fn sort_intervals<S: AsRef<str>>(names: &[S]) -> Result<Vec<Interval>, LookbackError> {
    let mut intervals = names
        .iter()
        .map(|name| name.as_ref().parse::<Interval>())
        .collect::<Result<Vec<_>, _>>()?;
    intervals.sort_by_key(|i| i.millis());
    intervals.dedup();
    Ok(intervals)
}

/// An interval bound to a session.
///
/// Accepts instants in any timezone and answers in the session's timezone.
#[derive(Debug, Clone, Copy)]
pub struct Period<'a> {
    session: &'a Session,
    interval: Interval,
}

impl<'a> Period<'a> {
    /// The session's operative interval.
    pub fn new(session: &'a Session) -> Self {
        Self {
            session,
            interval: session.interval(),
        }
    }

    pub fn of(session: &'a Session, interval: Interval) -> Self {
        Self { session, interval }
    }

    pub fn interval(&self) -> Interval {
        self.interval
    }

    pub fn value(&self) -> &'static str {
        self.interval.value()
    }

    pub fn millis(&self) -> i64 {
        self.interval.millis()
    }

    pub fn floor<Z: TimeZone>(&self, t: &DateTime<Z>) -> Result<DateTime<Tz>, LookbackError> {
        self.interval.floor(self.session, &self.session.local(t))
    }

    pub fn ceil<Z: TimeZone>(&self, t: &DateTime<Z>) -> Result<DateTime<Tz>, LookbackError> {
        self.interval.ceil(self.session, &self.session.local(t))
    }

    pub fn inc<Z: TimeZone>(
        &self,
        t: &DateTime<Z>,
        amount: i64,
    ) -> Result<DateTime<Tz>, LookbackError> {
        self.interval.inc(self.session, &self.session.local(t), amount)
    }

    pub fn dec<Z: TimeZone>(
        &self,
        t: &DateTime<Z>,
        amount: i64,
    ) -> Result<DateTime<Tz>, LookbackError> {
        self.interval.dec(self.session, &self.session.local(t), amount)
    }

    pub fn diff<Z1: TimeZone, Z2: TimeZone>(
        &self,
        to: &DateTime<Z1>,
        from: &DateTime<Z2>,
    ) -> Result<i64, LookbackError> {
        self.interval.diff(
            self.session,
            &self.session.local(to),
            &self.session.local(from),
        )
    }
}
