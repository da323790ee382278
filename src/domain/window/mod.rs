//! Rolling-window operators over [`Calc`]s.
//!
//! Every operator validates its literal length eagerly and returns a new
//! calc whose warm-up is a fixed function of the length and the wrapped
//! calc's warm-up. Index operators ([`indexed`]) slice recent bars by
//! position; calendar operators ([`calendar`]) cut the sequence at trading
//! day boundaries found through the interval calendar.

pub mod calendar;
pub mod indexed;

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;

use crate::domain::bar::Bar;
use crate::domain::calc::Calc;
use crate::domain::error::LookbackError;
use crate::domain::session::Session;

/// Convergence margins for the recursive averages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSettings {
    /// EMA samples `ema_multiplier * n` values.
    pub ema_multiplier: usize,
    /// SLOPE declares a warm-up of `slope_multiplier * n`.
    pub slope_multiplier: usize,
    /// RSI smooths over `n + rsi_lookback` values.
    pub rsi_lookback: usize,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            ema_multiplier: 10,
            slope_multiplier: 10,
            rsi_lookback: 250,
        }
    }
}

/// Operator factory bound to one session.
#[derive(Debug, Clone)]
pub struct WindowEngine {
    session: Session,
    settings: WindowSettings,
    day_length: f64,
}

impl WindowEngine {
    pub fn new(session: Session) -> Result<Self, LookbackError> {
        Self::with_settings(session, WindowSettings::default())
    }

    pub fn with_settings(
        session: Session,
        settings: WindowSettings,
    ) -> Result<Self, LookbackError> {
        let day_length = day_length(&session)?;
        Ok(Self {
            session,
            settings,
            day_length,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn settings(&self) -> WindowSettings {
        self.settings
    }

    /// Operative-interval periods from premarket open to after-hours close.
    pub fn day_length(&self) -> f64 {
        self.day_length
    }

    /// Builds an operator by registry entry.
    pub fn apply(
        &self,
        op: Operator,
        length: Option<f64>,
        calc: &Calc,
    ) -> Result<Calc, LookbackError> {
        let n = match (op.takes_length(), length) {
            (true, Some(n)) => n,
            (false, None) => 0.0,
            (true, None) => {
                return Err(LookbackError::invalid_argument(op.name(), "a length is required"));
            }
            (false, Some(_)) => {
                return Err(LookbackError::invalid_argument(op.name(), "takes no length"));
            }
        };
        match op {
            Operator::Offset => self.offset(n, calc),
            Operator::Highest => self.highest(n, calc),
            Operator::Lowest => self.lowest(n, calc),
            Operator::Aoh => self.aoh(n, calc),
            Operator::Sma => self.sma(n, calc),
            Operator::Ema => self.ema(n, calc),
            Operator::Pf => self.pf(n, calc),
            Operator::Slope => self.slope(n, calc),
            Operator::Stdev => self.stdev(n, calc),
            Operator::Rsi => self.rsi(n, calc),
            Operator::Prior => self.prior(n, calc),
            Operator::Since => self.since(n, calc),
            Operator::Past => self.past(n, calc),
            Operator::Session => Ok(self.session_hours(calc)),
            Operator::Tod => Ok(self.tod(calc)),
            Operator::Opening => Ok(self.opening(calc)),
        }
    }

    /// Bars of margin covering `days` sessions, doubled for extended hours.
    fn day_margin(&self, days: f64) -> usize {
        (days * self.day_length * 2.0).ceil() as usize
    }
}

fn day_length(session: &Session) -> Result<f64, LookbackError> {
    let reference = NaiveDate::from_ymd_opt(2010, 3, 1)
        .ok_or_else(|| LookbackError::invalid_session("reference date out of range"))?;
    let opens = session.at(reference, session.premarket_opens_at())?;
    let mut closes = session.at(reference, session.after_hours_closes_at())?;
    if closes <= opens {
        closes = session.shift_days(&closes, 1)?;
    }
    let span = (closes - opens).num_milliseconds() as f64;
    Ok(span / session.interval().millis() as f64)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Offset,
    Highest,
    Lowest,
    Aoh,
    Sma,
    Ema,
    Pf,
    Slope,
    Stdev,
    Rsi,
    Prior,
    Since,
    Past,
    Session,
    Tod,
    Opening,
}

impl Operator {
    pub const ALL: [Operator; 16] = [
        Operator::Offset,
        Operator::Highest,
        Operator::Lowest,
        Operator::Aoh,
        Operator::Sma,
        Operator::Ema,
        Operator::Pf,
        Operator::Slope,
        Operator::Stdev,
        Operator::Rsi,
        Operator::Prior,
        Operator::Since,
        Operator::Past,
        Operator::Session,
        Operator::Tod,
        Operator::Opening,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Operator::Offset => "OFFSET",
            Operator::Highest => "HIGHEST",
            Operator::Lowest => "LOWEST",
            Operator::Aoh => "AOH",
            Operator::Sma => "SMA",
            Operator::Ema => "EMA",
            Operator::Pf => "PF",
            Operator::Slope => "SLOPE",
            Operator::Stdev => "STDEV",
            Operator::Rsi => "RSI",
            Operator::Prior => "PRIOR",
            Operator::Since => "SINCE",
            Operator::Past => "PAST",
            Operator::Session => "SESSION",
            Operator::Tod => "TOD",
            Operator::Opening => "OPENING",
        }
    }

    /// Whether the operator's first argument is a literal length.
    pub fn takes_length(self) -> bool {
        !matches!(self, Operator::Session | Operator::Tod | Operator::Opening)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Operator {
    type Err = LookbackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_uppercase();
        Operator::ALL
            .into_iter()
            .find(|op| op.name() == name)
            .ok_or(LookbackError::UnknownOperator { name })
    }
}

/// Accepts a positive, finite, whole length.
pub(crate) fn positive_integer(n: f64, op: &str) -> Result<usize, LookbackError> {
    if n > 0.0 && n.is_finite() && n.fract() == 0.0 && n <= usize::MAX as f64 {
        Ok(n as usize)
    } else {
        Err(LookbackError::invalid_argument(
            op,
            format!("expected a literal positive integer, not {n}"),
        ))
    }
}

/// Evaluates `calc` on each of the last `size` windows of `bars`, oldest
/// first. Each window holds at most the calc's warm-up plus one bar.
pub(crate) fn values(size: usize, calc: &Calc, bars: &[Bar]) -> Result<Vec<f64>, LookbackError> {
    let window = calc.warm_up().window();
    let m = size.min(bars.len());
    (bars.len() - m..bars.len())
        .map(|i| calc.eval(&bars[(i + 1).saturating_sub(window)..=i]))
        .collect()
}

/// Sum with undefined values counted as zero.
pub(crate) fn sum(values: &[f64]) -> f64 {
    values.iter().filter(|v| !v.is_nan()).sum()
}

/// Rounds to 12 significant digits.
pub fn precision(value: f64) -> f64 {
    if !value.is_finite() || value == 0.0 {
        return value;
    }
    format!("{value:.11e}").parse().unwrap_or(value)
}
