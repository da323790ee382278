//! Operators that cut bar history at trading-day boundaries or filter it by
//! local time of day.
//!
//! Cuts use a binary search on `ending`: the cut index is the first bar
//! ending strictly after the boundary.

use chrono::{DateTime, Datelike, FixedOffset, Months, NaiveTime, Offset, TimeZone, Weekday};
use chrono_tz::Tz;
use tracing::debug;

use crate::domain::bar::Bar;
use crate::domain::calc::{Calc, WarmUp};
use crate::domain::error::LookbackError;
use crate::domain::interval::{Interval, Period};
use crate::domain::session::Session;
use crate::domain::window::{WindowEngine, positive_integer};

impl WindowEngine {
    /// `field` as of the session close `d` trading days before the last bar.
    pub fn prior(&self, d: f64, field: &Calc) -> Result<Calc, LookbackError> {
        let d = positive_integer(d, "PRIOR")?;
        let days = as_amount(d, "PRIOR")?;
        let warm_up = field.warm_up().plus(self.day_margin(d as f64 + 1.0));
        let session = *self.session();
        let inner = field.clone();
        Ok(Calc::new(warm_up, move |bars| {
            let Some(last) = bars.last() else {
                return inner.eval(bars);
            };
            let day = trading_day_start(&session, &last.ending, days)?;
            let prior = session.closes_on(day.date_naive())?;
            let end = cut(bars, &prior);
            if end == 0 {
                debug!(boundary = %prior, "PRIOR boundary precedes the supplied bars");
            }
            let start = end.saturating_sub(inner.warm_up().window());
            inner.eval(&bars[start..end])
        })
        .with_fields(field.fields().iter().cloned())
        .with_fields(["ending"]))
    }

    /// `calc` over the bars starting with the current trading day when
    /// `d` is 1, or `d - 1` trading days earlier.
    pub fn since(&self, d: f64, calc: &Calc) -> Result<Calc, LookbackError> {
        let d = positive_integer(d, "SINCE")?;
        let days = as_amount(d - 1, "SINCE")?;
        let warm_up = calc
            .warm_up()
            .plus(self.day_margin(d as f64 + 1.0))
            .minus(1);
        let session = *self.session();
        let inner = calc.clone();
        Ok(Calc::new(warm_up, move |bars| {
            let Some(last) = bars.last() else {
                return inner.eval(bars);
            };
            let since = trading_day_start(&session, &last.ending, days)?;
            eval_from(&inner, bars, cut(bars, &since))
        })
        .with_fields(calc.fields().iter().cloned())
        .with_fields(["ending"]))
    }

    /// `calc` over the bars of the past `d` days counted as elapsed calendar
    /// days back to the trading day `d` days before the last bar.
    pub fn past(&self, d: f64, calc: &Calc) -> Result<Calc, LookbackError> {
        let d = positive_integer(d, "PAST")?;
        let days = as_amount(d, "PAST")?;
        let warm_up = calc
            .warm_up()
            .plus(self.day_margin(d as f64 + 1.0))
            .minus(1);
        let session = *self.session();
        let inner = calc.clone();
        Ok(Calc::new(warm_up, move |bars| {
            let Some(last) = bars.last() else {
                return inner.eval(bars);
            };
            let anchor = session.local(&last.ending);
            let back = trading_day_start(&session, &last.ending, days)?;
            let elapsed = (anchor.naive_local() - back.naive_local()).num_days();
            let elapsed = if anchor.weekday() == Weekday::Sun {
                elapsed + 1
            } else {
                elapsed
            };
            let since = session.shift_days(&anchor, -elapsed)?;
            eval_from(&inner, bars, cut(bars, &since))
        })
        .with_fields(calc.fields().iter().cloned())
        .with_fields(["ending"]))
    }

    /// `calc` over bars ending within regular hours, `(open, close]` local.
    pub fn session_hours(&self, calc: &Calc) -> Calc {
        let warm_up = calc.warm_up().plus(self.day_margin(1.0)).minus(1);
        let session = *self.session();
        let inner = calc.clone();
        Calc::new(warm_up, move |bars| {
            let (Some(first), Some(last)) = (bars.first(), bars.last()) else {
                return inner.eval(bars);
            };
            let (opens_at, closes_at) = (session.market_opens_at(), session.market_closes_at());
            if opens_at == closes_at {
                return inner.eval(bars);
            }
            let opens = session.opens_on(session.local(&first.ending).date_naive())?;
            let closes = session.closes_on(session.local(&last.ending).date_naive())?;
            let clock = LocalClock::new(&session, &opens, &closes);
            let within = |time: NaiveTime| {
                if opens_at < closes_at {
                    opens_at < time && time <= closes_at
                } else {
                    opens_at < time || time <= closes_at
                }
            };
            let filtered: Vec<Bar> = bars
                .iter()
                .filter(|bar| within(clock.time(&bar.ending)))
                .copied()
                .collect();
            inner.eval(&filtered)
        })
        .with_fields(calc.fields().iter().cloned())
        .with_fields(["ending"])
    }

    /// `calc` over bars ending at the same local time of day as the last bar.
    pub fn tod(&self, calc: &Calc) -> Calc {
        let warm_up = match calc.warm_up().bars() {
            Some(w) => WarmUp::Bars(self.day_margin(w as f64 + 1.0)),
            None => WarmUp::Unbounded,
        };
        let session = *self.session();
        let inner = calc.clone();
        Calc::new(warm_up, move |bars| {
            let (Some(first), Some(last)) = (bars.first(), bars.last()) else {
                return inner.eval(bars);
            };
            let (first, last) = (session.local(&first.ending), session.local(&last.ending));
            let clock = LocalClock::new(&session, &first, &last);
            let time = last.time();
            let filtered: Vec<Bar> = bars
                .iter()
                .filter(|bar| clock.time(&bar.ending) == time)
                .copied()
                .collect();
            inner.eval(&filtered)
        })
        .with_fields(calc.fields().iter().cloned())
        .with_fields(["ending"])
    }

    /// `calc` on the earliest supplied bar only.
    pub fn opening(&self, calc: &Calc) -> Calc {
        let inner = calc.clone();
        Calc::new(WarmUp::Unbounded, move |bars| {
            inner.eval(&bars[..bars.len().min(1)])
        })
        .with_fields(calc.fields().iter().cloned())
    }
}

/// Reads local time of day for bar endings.
///
/// When the range carries one UTC offset and spans under two months, bars
/// already stamped with that offset are read directly; anything else goes
/// through the timezone database.
struct LocalClock<'a> {
    session: &'a Session,
    steady: Option<FixedOffset>,
}

impl<'a> LocalClock<'a> {
    fn new(session: &'a Session, from: &DateTime<Tz>, to: &DateTime<Tz>) -> Self {
        let offset = from.offset().fix();
        let short = from
            .naive_local()
            .checked_add_months(Months::new(2))
            .is_some_and(|limit| to.naive_local() < limit);
        let steady = (offset == to.offset().fix() && short).then_some(offset);
        Self { session, steady }
    }

    fn time(&self, ending: &DateTime<FixedOffset>) -> NaiveTime {
        match self.steady {
            Some(offset) if *ending.offset() == offset => ending.time(),
            _ => self.session.local(ending).time(),
        }
    }
}

/// Midnight starting the trading day `back` days before the one holding `t`.
///
/// A weekend is the day after Friday: it starts at Saturday midnight, and
/// one day back from it is Friday.
fn trading_day_start(
    session: &Session,
    t: &DateTime<FixedOffset>,
    back: i64,
) -> Result<DateTime<Tz>, LookbackError> {
    let day = Period::of(session, Interval::Day);
    let local = session.local(t);
    match local.weekday() {
        Weekday::Sat | Weekday::Sun if back == 0 => {
            let days = i64::from(local.weekday().num_days_from_monday()) - 5;
            session.midnight(session.shift_days(&local, -days)?.date_naive())
        }
        Weekday::Sat | Weekday::Sun => day.dec(&day.ceil(&local)?, back),
        _ => day.dec(&local, back),
    }
}

/// Index of the first bar ending strictly after `boundary`.
fn cut<Z: TimeZone>(bars: &[Bar], boundary: &DateTime<Z>) -> usize {
    let boundary = boundary.fixed_offset();
    bars.partition_point(|bar| bar.ending <= boundary)
}

/// Evaluates `calc` on a window-sized run of bars beginning at `start`.
fn eval_from(calc: &Calc, bars: &[Bar], start: usize) -> Result<f64, LookbackError> {
    if start >= bars.len() {
        return calc.eval(&[]);
    }
    let end = start.saturating_add(calc.warm_up().window()).min(bars.len());
    calc.eval(&bars[start..end])
}

fn as_amount(days: usize, op: &str) -> Result<i64, LookbackError> {
    i64::try_from(days)
        .map_err(|_| LookbackError::invalid_argument(op, format!("{days} days is too many")))
}
