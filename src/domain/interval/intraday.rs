//! Intraday grids walked across Monday–Friday session hours.
//!
//! A [`Grid`] snaps instants to bucket boundaries and walks whole buckets,
//! clamping into `[open, close]`, skipping weekends and jumping whole trading
//! weeks before resolving the remainder one session at a time.
//!
//! Minute buckets sit on the epoch grid. Hour buckets sit on the exchange's
//! local clock so that 2h/4h buckets share their boundaries with the bucket
//! holding the session open. The first bucket of a session is reported at
//! the open itself rather than at its grid boundary.

use chrono::{DateTime, Datelike, Duration, Timelike};
use chrono_tz::Tz;
use tracing::{debug, warn};

use crate::domain::error::LookbackError;
use crate::domain::session::Session;

/// Upper bound on session hops for one walk; each hop strictly advances
/// (or retreats) the cursor.
const MAX_STEPS: usize = 64;

const TRADING_DAYS_PER_WEEK: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Grid {
    Minutes(i64),
    Hours(i64),
}

/// Session boundaries of one trading date, snapped to the grid.
struct Day {
    opens: DateTime<Tz>,
    floor_opens: DateTime<Tz>,
    closes: DateTime<Tz>,
    ceil_closes: DateTime<Tz>,
}

impl Grid {
    /// The single source of weekday and session clamping for minute intervals.
    pub(super) const BASE: Grid = Grid::Minutes(1);

    fn unit(self) -> Duration {
        match self {
            Grid::Minutes(k) => Duration::minutes(k),
            Grid::Hours(h) => Duration::hours(h),
        }
    }

    fn units(self, amount: i64) -> Duration {
        Duration::milliseconds(self.unit().num_milliseconds() * amount)
    }

    pub(super) fn floor(self, t: &DateTime<Tz>) -> DateTime<Tz> {
        match self {
            Grid::Minutes(k) => {
                let excess = Duration::seconds(t.timestamp().rem_euclid(k * 60))
                    + Duration::nanoseconds(i64::from(t.timestamp_subsec_nanos()));
                *t - excess
            }
            Grid::Hours(h) => {
                let hour = top_of_hour(t);
                hour - Duration::hours(i64::from(hour.hour()) % h)
            }
        }
    }

    pub(super) fn ceil(self, t: &DateTime<Tz>) -> DateTime<Tz> {
        match self {
            Grid::Minutes(_) => {
                let start = self.floor(t);
                if start < *t { start + self.unit() } else { start }
            }
            Grid::Hours(h) => {
                let mut hour = top_of_hour(t);
                if hour < *t {
                    hour = hour + Duration::hours(1);
                }
                let misaligned = i64::from(hour.hour()) % h;
                if misaligned == 0 {
                    hour
                } else {
                    hour + Duration::hours(h - misaligned)
                }
            }
        }
    }

    fn day(self, session: &Session, t: &DateTime<Tz>) -> Result<Day, LookbackError> {
        let date = t.date_naive();
        let opens = session.opens_on(date)?;
        let closes = session.closes_on(date)?;
        Ok(Day {
            floor_opens: self.floor(&opens),
            ceil_closes: self.ceil(&closes),
            opens,
            closes,
        })
    }

    fn per_day(self, day: &Day) -> Result<i64, LookbackError> {
        let n = units_ceil(day.ceil_closes - day.floor_opens, self.unit());
        if n <= 0 {
            return Err(LookbackError::invalid_session(
                "market must close after it opens",
            ));
        }
        Ok(n)
    }

    pub(super) fn inc(
        self,
        session: &Session,
        t: &DateTime<Tz>,
        amount: i64,
    ) -> Result<DateTime<Tz>, LookbackError> {
        check_hours(session)?;
        let mut at = *t;
        let mut amount = amount;
        for _ in 0..MAX_STEPS {
            let day = self.day(session, &at)?;
            let start = if day.floor_opens <= at && at <= day.opens {
                day.floor_opens
            } else {
                self.ceil(&at)
            };
            let weekday = weekday(&start);
            if weekday > 5 {
                debug!(at = %start, "inc starts on a weekend; moving to Monday's open");
                at = session.opens_on(session.shift_days(&start, 8 - weekday)?.date_naive())?;
                continue;
            }
            if start < day.floor_opens {
                at = day.opens;
                continue;
            }
            if start > day.ceil_closes {
                at = session.shift_days(&day.opens, 1)?;
                continue;
            }
            let per_day = self.per_day(&day)?;
            let weeks = amount / TRADING_DAYS_PER_WEEK / per_day;
            if weeks > 0 {
                at = session.shift_days(&start, 7 * weeks)?;
                amount -= weeks * TRADING_DAYS_PER_WEEK * per_day;
                continue;
            }
            let until_close = units_ceil(day.ceil_closes - start, self.unit());
            if until_close < amount {
                at = session.shift_days(&day.opens, 1)?;
                amount -= until_close;
                continue;
            }
            if amount == 0 && start == day.floor_opens {
                return Ok(day.opens);
            }
            return Ok(start + self.units(amount));
        }
        Err(did_not_settle("inc", t))
    }

    pub(super) fn dec(
        self,
        session: &Session,
        t: &DateTime<Tz>,
        amount: i64,
    ) -> Result<DateTime<Tz>, LookbackError> {
        check_hours(session)?;
        let mut at = *t;
        let mut amount = amount;
        for _ in 0..MAX_STEPS {
            let start = self.floor(&at);
            let weekday = weekday(&start);
            if weekday > 5 {
                debug!(at = %start, "dec starts on a weekend; moving to Friday's close");
                at = session.closes_on(session.shift_days(&start, 5 - weekday)?.date_naive())?;
                continue;
            }
            let day = self.day(session, &start)?;
            if start < day.floor_opens || at < day.opens {
                at = session.shift_days(&day.closes, -1)?;
                continue;
            }
            if start > day.ceil_closes {
                at = day.closes;
                continue;
            }
            let per_day = self.per_day(&day)?;
            let weeks = amount / TRADING_DAYS_PER_WEEK / per_day;
            if weeks > 0 {
                at = session.shift_days(&start, -7 * weeks)?;
                amount -= weeks * TRADING_DAYS_PER_WEEK * per_day;
                continue;
            }
            let since_open = units_ceil(start - day.floor_opens, self.unit());
            if since_open < amount {
                at = session.shift_days(&day.closes, -1)?;
                amount -= since_open;
                continue;
            }
            let result = start - self.units(amount);
            return Ok(if result == day.floor_opens {
                day.opens
            } else {
                result
            });
        }
        Err(did_not_settle("dec", t))
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
        let end = self.dec(session, to, 0)?;
        let mut cursor = *from;
        let mut total = 0;
        for _ in 0..MAX_STEPS {
            let start = self.inc(session, &cursor, 0)?;
            if end < start {
                return Ok(total);
            }
            let day = self.day(session, &start)?;
            let per_day = self.per_day(&day)?;
            let span = end.naive_local() - start.naive_local();
            let weeks = span.num_weeks();
            if weeks > 0 {
                total += weeks * TRADING_DAYS_PER_WEEK * per_day;
                cursor = session.shift_days(&start, 7 * weeks)?;
                continue;
            }
            let days = span.num_days();
            if days > 0 && weekday(&start) < weekday(&end) {
                total += days * per_day;
                cursor = session.shift_days(&start, days)?;
                continue;
            }
            if end > day.ceil_closes {
                total += units_ceil(day.ceil_closes - start, self.unit());
                cursor = session.shift_days(&day.opens, 1)?;
                continue;
            }
            return Ok(total + units_ceil(end - start, self.unit()));
        }
        Err(did_not_settle("diff", from))
    }
}

fn check_hours(session: &Session) -> Result<(), LookbackError> {
    if session.market_closes_at() <= session.market_opens_at() {
        return Err(LookbackError::invalid_session(format!(
            "intraday intervals need marketClosesAt ({}) after marketOpensAt ({})",
            session.market_closes_at(),
            session.market_opens_at()
        )));
    }
    Ok(())
}

fn did_not_settle(op: &str, t: &DateTime<Tz>) -> LookbackError {
    warn!(op, at = %t, "calendar walk exceeded {MAX_STEPS} session steps");
    LookbackError::invalid_session(format!(
        "{op} from {t} did not settle within {MAX_STEPS} session steps"
    ))
}

/// ISO weekday, Monday = 1.
fn weekday(t: &DateTime<Tz>) -> i64 {
    i64::from(t.weekday().number_from_monday())
}

fn top_of_hour(t: &DateTime<Tz>) -> DateTime<Tz> {
    *t - Duration::seconds(i64::from(t.minute() * 60 + t.second()))
        - Duration::nanoseconds(i64::from(t.nanosecond()))
}

/// Number of whole or partial units in a span.
fn units_ceil(span: Duration, unit: Duration) -> i64 {
    let unit = unit.num_milliseconds();
    -(-span.num_milliseconds()).div_euclid(unit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    fn session() -> Session {
        Session::new("m1", "09:30", "16:00", "America/New_York").unwrap()
    }

    fn at(session: &Session, y: i32, m: u32, d: u32, hh: u32, mm: u32) -> DateTime<Tz> {
        session
            .tz()
            .from_local_datetime(
                &NaiveDate::from_ymd_opt(y, m, d)
                    .unwrap()
                    .and_hms_opt(hh, mm, 0)
                    .unwrap(),
            )
            .single()
            .unwrap()
    }

    // 2024-01-05 is a Friday, 2024-01-08 a Monday.

    #[test]
    fn minute_floor_and_ceil() {
        let s = session();
        let t = at(&s, 2024, 1, 3, 10, 7) + Duration::seconds(30);
        assert_eq!(Grid::Minutes(1).floor(&t), at(&s, 2024, 1, 3, 10, 7));
        assert_eq!(Grid::Minutes(1).ceil(&t), at(&s, 2024, 1, 3, 10, 8));
        assert_eq!(Grid::Minutes(5).floor(&t), at(&s, 2024, 1, 3, 10, 5));
        assert_eq!(Grid::Minutes(5).ceil(&t), at(&s, 2024, 1, 3, 10, 10));
        let aligned = at(&s, 2024, 1, 3, 10, 10);
        assert_eq!(Grid::Minutes(5).ceil(&aligned), aligned);
    }

    #[test]
    fn hour_grids_follow_local_clock() {
        let s = session();
        let t = at(&s, 2024, 1, 3, 11, 15);
        assert_eq!(Grid::Hours(1).floor(&t), at(&s, 2024, 1, 3, 11, 0));
        assert_eq!(Grid::Hours(2).floor(&t), at(&s, 2024, 1, 3, 10, 0));
        assert_eq!(Grid::Hours(2).ceil(&t), at(&s, 2024, 1, 3, 12, 0));
        assert_eq!(Grid::Hours(4).floor(&t), at(&s, 2024, 1, 3, 8, 0));
        assert_eq!(Grid::Hours(4).ceil(&t), at(&s, 2024, 1, 3, 12, 0));
        let noon = at(&s, 2024, 1, 3, 12, 0);
        assert_eq!(Grid::Hours(4).ceil(&noon), noon);
    }

    #[test]
    fn minute_inc_skips_weekend() {
        let s = session();
        let friday = at(&s, 2024, 1, 5, 15, 59);
        let monday = Grid::BASE.inc(&s, &friday, 2).unwrap();
        assert_eq!(monday, at(&s, 2024, 1, 8, 9, 31));
    }

    #[test]
    fn minute_dec_skips_weekend() {
        let s = session();
        let monday = at(&s, 2024, 1, 8, 9, 31);
        let friday = Grid::BASE.dec(&s, &monday, 2).unwrap();
        assert_eq!(friday, at(&s, 2024, 1, 5, 15, 59));
    }

    #[test]
    fn minute_inc_clamps_into_session() {
        let s = session();
        let early = at(&s, 2024, 1, 3, 7, 0);
        assert_eq!(
            Grid::BASE.inc(&s, &early, 0).unwrap(),
            at(&s, 2024, 1, 3, 9, 30)
        );
        let late = at(&s, 2024, 1, 3, 18, 0);
        assert_eq!(
            Grid::BASE.inc(&s, &late, 1).unwrap(),
            at(&s, 2024, 1, 4, 9, 31)
        );
        let saturday = at(&s, 2024, 1, 6, 12, 0);
        assert_eq!(
            Grid::BASE.inc(&s, &saturday, 0).unwrap(),
            at(&s, 2024, 1, 8, 9, 30)
        );
    }

    #[test]
    fn minute_dec_clamps_into_session() {
        let s = session();
        let late = at(&s, 2024, 1, 3, 18, 0);
        assert_eq!(
            Grid::BASE.dec(&s, &late, 0).unwrap(),
            at(&s, 2024, 1, 3, 16, 0)
        );
        let early = at(&s, 2024, 1, 3, 7, 0);
        assert_eq!(
            Grid::BASE.dec(&s, &early, 1).unwrap(),
            at(&s, 2024, 1, 2, 15, 59)
        );
        let sunday = at(&s, 2024, 1, 7, 12, 0);
        assert_eq!(
            Grid::BASE.dec(&s, &sunday, 0).unwrap(),
            at(&s, 2024, 1, 5, 16, 0)
        );
    }

    #[test]
    fn minute_inc_jumps_whole_weeks() {
        let s = session();
        let wednesday = at(&s, 2024, 1, 3, 10, 0);
        let week = 5 * 390;
        assert_eq!(
            Grid::BASE.inc(&s, &wednesday, week + 10).unwrap(),
            at(&s, 2024, 1, 10, 10, 10)
        );
        assert_eq!(
            Grid::BASE.inc(&s, &wednesday, week - 1).unwrap(),
            at(&s, 2024, 1, 10, 9, 59)
        );
    }

    #[test]
    fn minute_diff_inverts_inc() {
        let s = session();
        let wednesday = at(&s, 2024, 1, 3, 10, 0);
        for n in [0, 1, 359, 360, 361, 390, 1949, 1950, 1951, 4000] {
            let later = Grid::BASE.inc(&s, &wednesday, n).unwrap();
            assert_eq!(Grid::BASE.diff(&s, &later, &wednesday).unwrap(), n, "n={n}");
            assert_eq!(Grid::BASE.diff(&s, &wednesday, &later).unwrap(), -n, "n={n}");
        }
    }

    #[test]
    fn minute_diff_across_weekend() {
        let s = session();
        let friday = at(&s, 2024, 1, 5, 15, 59);
        let monday = at(&s, 2024, 1, 8, 9, 31);
        assert_eq!(Grid::BASE.diff(&s, &monday, &friday).unwrap(), 2);
    }

    #[test]
    fn hour_inc_reports_open_for_first_bucket() {
        let s = session();
        let opens = at(&s, 2024, 1, 8, 9, 30);
        assert_eq!(Grid::Hours(1).inc(&s, &opens, 0).unwrap(), opens);
        assert_eq!(
            Grid::Hours(1).inc(&s, &opens, 1).unwrap(),
            at(&s, 2024, 1, 8, 10, 0)
        );
        assert_eq!(
            Grid::Hours(1).inc(&s, &opens, 7).unwrap(),
            at(&s, 2024, 1, 8, 16, 0)
        );
        assert_eq!(
            Grid::Hours(1).inc(&s, &opens, 8).unwrap(),
            at(&s, 2024, 1, 9, 10, 0)
        );
    }

    #[test]
    fn hour_boundaries_before_the_open() {
        let s = session();
        let early = at(&s, 2024, 1, 8, 9, 15);
        assert_eq!(
            Grid::Hours(1).inc(&s, &early, 0).unwrap(),
            at(&s, 2024, 1, 8, 9, 30)
        );
        assert_eq!(
            Grid::Hours(1).inc(&s, &early, 1).unwrap(),
            at(&s, 2024, 1, 8, 10, 0)
        );
        assert_eq!(
            Grid::Hours(1).dec(&s, &early, 0).unwrap(),
            at(&s, 2024, 1, 5, 16, 0)
        );
    }

    #[test]
    fn hour_dec_lands_on_open() {
        let s = session();
        let ten = at(&s, 2024, 1, 9, 10, 0);
        assert_eq!(
            Grid::Hours(1).dec(&s, &ten, 1).unwrap(),
            at(&s, 2024, 1, 9, 9, 30)
        );
        let opens = at(&s, 2024, 1, 9, 9, 30);
        assert_eq!(
            Grid::Hours(1).dec(&s, &opens, 1).unwrap(),
            at(&s, 2024, 1, 8, 15, 0)
        );
    }

    #[test]
    fn hour_diff_counts_partial_first_bucket() {
        let s = session();
        let opens = at(&s, 2024, 1, 8, 9, 30);
        let closes = at(&s, 2024, 1, 8, 16, 0);
        assert_eq!(Grid::Hours(1).diff(&s, &closes, &opens).unwrap(), 7);
        let next = at(&s, 2024, 1, 9, 10, 0);
        assert_eq!(Grid::Hours(1).diff(&s, &next, &opens).unwrap(), 8);
        assert_eq!(Grid::Hours(1).diff(&s, &opens, &next).unwrap(), -8);
    }

    #[test]
    fn two_hour_buckets() {
        let s = session();
        let opens = at(&s, 2024, 1, 8, 9, 30);
        assert_eq!(Grid::Hours(2).inc(&s, &opens, 0).unwrap(), opens);
        assert_eq!(
            Grid::Hours(2).inc(&s, &opens, 1).unwrap(),
            at(&s, 2024, 1, 8, 10, 0)
        );
        assert_eq!(
            Grid::Hours(2).inc(&s, &opens, 4).unwrap(),
            at(&s, 2024, 1, 8, 16, 0)
        );
        assert_eq!(
            Grid::Hours(2).inc(&s, &opens, 5).unwrap(),
            at(&s, 2024, 1, 9, 10, 0)
        );
        let later = at(&s, 2024, 1, 9, 10, 0);
        assert_eq!(Grid::Hours(2).diff(&s, &later, &opens).unwrap(), 5);
    }

    #[test]
    fn inverted_hours_are_invalid_session() {
        let s = Session::new("m1", "16:00", "09:30", "America/New_York").unwrap();
        let t = at(&s, 2024, 1, 3, 10, 0);
        assert!(matches!(
            Grid::BASE.inc(&s, &t, 1),
            Err(LookbackError::InvalidSession { .. })
        ));
        let round_the_clock = Session::new("m1", "00:00", "00:00", "UTC").unwrap();
        assert!(matches!(
            Grid::Hours(1).dec(&round_the_clock, &t, 1),
            Err(LookbackError::InvalidSession { .. })
        ));
    }

    #[test]
    fn huge_amounts_are_errors_not_panics() {
        let s = session();
        let t = at(&s, 2024, 1, 3, 10, 0);
        assert!(matches!(
            Grid::BASE.inc(&s, &t, 1_000_000_000_000_000),
            Err(LookbackError::InvalidArgument { .. })
        ));
        assert!(matches!(
            Grid::Hours(1).dec(&s, &t, i64::MAX / 2),
            Err(LookbackError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn units_ceil_rounds_up() {
        assert_eq!(units_ceil(Duration::minutes(90), Duration::hours(1)), 2);
        assert_eq!(units_ceil(Duration::minutes(60), Duration::hours(1)), 1);
        assert_eq!(units_ceil(Duration::zero(), Duration::hours(1)), 0);
    }
}
