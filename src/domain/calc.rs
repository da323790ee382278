//! Composable bar-history functions.
//!
//! A [`Calc`] maps an ascending bar slice to a value and declares how many
//! preceding bars it needs ([`WarmUp`]). Window operators wrap calcs into new
//! calcs; the warm-up tells callers how much history to fetch. Results that
//! are not defined for the supplied bars are `NaN`.

use std::fmt;
use std::sync::Arc;

use crate::domain::bar::{Bar, Field};
use crate::domain::error::LookbackError;

/// Count of preceding bars a calc needs before its result is well-defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WarmUp {
    Bars(usize),
    /// Every available bar.
    Unbounded,
}

impl WarmUp {
    pub fn plus(self, n: usize) -> WarmUp {
        match self {
            WarmUp::Bars(b) => b.checked_add(n).map_or(WarmUp::Unbounded, WarmUp::Bars),
            WarmUp::Unbounded => WarmUp::Unbounded,
        }
    }

    pub fn minus(self, n: usize) -> WarmUp {
        match self {
            WarmUp::Bars(b) => WarmUp::Bars(b.saturating_sub(n)),
            WarmUp::Unbounded => WarmUp::Unbounded,
        }
    }

    /// Bars in one evaluation window: the warm-up plus the bar of interest.
    pub fn window(self) -> usize {
        match self {
            WarmUp::Bars(b) => b.saturating_add(1),
            WarmUp::Unbounded => usize::MAX,
        }
    }

    pub fn bars(self) -> Option<usize> {
        match self {
            WarmUp::Bars(b) => Some(b),
            WarmUp::Unbounded => None,
        }
    }
}

impl fmt::Display for WarmUp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WarmUp::Bars(b) => write!(f, "{b}"),
            WarmUp::Unbounded => f.write_str("unbounded"),
        }
    }
}

type EvalFn = dyn Fn(&[Bar]) -> Result<f64, LookbackError> + Send + Sync;

/// A pure function of an ordered bar sequence.
#[derive(Clone)]
pub struct Calc {
    eval: Arc<EvalFn>,
    warm_up: WarmUp,
    fields: Vec<String>,
}

impl Calc {
    pub fn new<F>(warm_up: WarmUp, eval: F) -> Self
    where
        F: Fn(&[Bar]) -> Result<f64, LookbackError> + Send + Sync + 'static,
    {
        Self {
            eval: Arc::new(eval),
            warm_up,
            fields: Vec::new(),
        }
    }

    /// Adds referenced field names, keeping the list free of duplicates.
    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for field in fields {
            let field = field.into();
            if !self.fields.contains(&field) {
                self.fields.push(field);
            }
        }
        self
    }

    /// The named field of the last bar; `NaN` on an empty sequence.
    pub fn field(field: Field) -> Self {
        Calc::new(WarmUp::Bars(0), move |bars| {
            Ok(bars.last().map_or(f64::NAN, |bar| bar.field(field)))
        })
        .with_fields([field.name()])
    }

    pub fn constant(value: f64) -> Self {
        Calc::new(WarmUp::Bars(0), move |_| Ok(value))
    }

    pub fn eval(&self, bars: &[Bar]) -> Result<f64, LookbackError> {
        (self.eval)(bars)
    }

    pub fn warm_up(&self) -> WarmUp {
        self.warm_up
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }
}

impl fmt::Debug for Calc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Calc")
            .field("warm_up", &self.warm_up)
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}
