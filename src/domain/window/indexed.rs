//! Operators over the most recent bars by position.

use crate::domain::calc::{Calc, WarmUp};
use crate::domain::error::LookbackError;
use crate::domain::window::{WindowEngine, positive_integer, precision, sum, values};

impl WindowEngine {
    /// `calc` as of `n` bars ago.
    pub fn offset(&self, n: f64, calc: &Calc) -> Result<Calc, LookbackError> {
        let n = positive_integer(n, "OFFSET")?;
        let inner = calc.clone();
        Ok(Calc::new(calc.warm_up().plus(n), move |bars| {
            inner.eval(&bars[..bars.len().saturating_sub(n)])
        })
        .with_fields(calc.fields().iter().cloned()))
    }

    pub fn highest(&self, n: f64, calc: &Calc) -> Result<Calc, LookbackError> {
        let n = positive_integer(n, "HIGHEST")?;
        let inner = calc.clone();
        Ok(Calc::new(calc.warm_up().plus(n).minus(1), move |bars| {
            let max = values(n, &inner, bars)?
                .into_iter()
                .fold(f64::NEG_INFINITY, f64::max);
            Ok(finite_or_nan(max))
        })
        .with_fields(calc.fields().iter().cloned()))
    }

    pub fn lowest(&self, n: f64, calc: &Calc) -> Result<Calc, LookbackError> {
        let n = positive_integer(n, "LOWEST")?;
        let inner = calc.clone();
        Ok(Calc::new(calc.warm_up().plus(n).minus(1), move |bars| {
            let min = values(n, &inner, bars)?
                .into_iter()
                .fold(f64::INFINITY, f64::min);
            Ok(finite_or_nan(min))
        })
        .with_fields(calc.fields().iter().cloned()))
    }

    /// Age of high: bars since the highest `high` of the last `n` bars.
    /// Ties resolve to the oldest occurrence.
    pub fn aoh(&self, n: f64, high: &Calc) -> Result<Calc, LookbackError> {
        let n = positive_integer(n, "AOH")?;
        let inner = high.clone();
        Ok(Calc::new(WarmUp::Bars(n - 1), move |bars| {
            let highs = values(n, &inner, bars)?;
            let max = highs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            if !max.is_finite() {
                return Ok(f64::NAN);
            }
            Ok(highs
                .iter()
                .position(|&h| h == max)
                .map_or(f64::NAN, |idx| (highs.len() - idx - 1) as f64))
        })
        .with_fields(high.fields().iter().cloned()))
    }

    pub fn sma(&self, n: f64, calc: &Calc) -> Result<Calc, LookbackError> {
        let n = positive_integer(n, "SMA")?;
        let inner = calc.clone();
        Ok(Calc::new(calc.warm_up().plus(n).minus(1), move |bars| {
            let values = values(n, &inner, bars)?;
            Ok(precision(sum(&values) / values.len() as f64))
        })
        .with_fields(calc.fields().iter().cloned()))
    }

    /// Exponential average seeded by the mean of the first `n` samples.
    pub fn ema(&self, n: f64, calc: &Calc) -> Result<Calc, LookbackError> {
        let n = positive_integer(n, "EMA")?;
        let samples = n.saturating_mul(self.settings().ema_multiplier);
        let inner = calc.clone();
        let a = 2.0 / (n as f64 + 1.0);
        Ok(Calc::new(calc.warm_up().plus(samples).minus(1), move |bars| {
            let values = values(samples, &inner, bars)?;
            let (seed, rest) = values.split_at(n.min(values.len()));
            let mean = seed.iter().sum::<f64>() / seed.len() as f64;
            let ema = rest.iter().fold(mean, |ema, v| a * v + (1.0 - a) * ema);
            Ok(precision(ema))
        })
        .with_fields(calc.fields().iter().cloned()))
    }

    /// Profit factor: gains over losses across `n` consecutive changes.
    pub fn pf(&self, n: f64, calc: &Calc) -> Result<Calc, LookbackError> {
        let n = positive_integer(n, "PF")?;
        let inner = calc.clone();
        Ok(Calc::new(calc.warm_up().plus(n), move |bars| {
            let prices = values(n.saturating_add(1), &inner, bars)?;
            let (mut profit, mut loss) = (0.0, 0.0);
            for pair in prices.windows(2) {
                let change = pair[1] - pair[0];
                if change > 0.0 {
                    profit += change;
                } else if change < 0.0 {
                    loss -= change;
                }
            }
            Ok(precision(profit / loss))
        })
        .with_fields(calc.fields().iter().cloned()))
    }

    /// Least-squares slope of the last `n` values against their index, in
    /// value units per bar: the values are regressed on the index, not the
    /// index on the values, so a series rising 2 per bar reports 2 rather
    /// than 0.5.
    pub fn slope(&self, n: f64, calc: &Calc) -> Result<Calc, LookbackError> {
        let n = positive_integer(n, "SLOPE")?;
        let warm_up = calc
            .warm_up()
            .plus(n.saturating_mul(self.settings().slope_multiplier))
            .minus(1);
        let inner = calc.clone();
        Ok(Calc::new(warm_up, move |bars| {
            let values = values(n, &inner, bars)?;
            let len = values.len() as f64;
            let (mut sx, mut sy, mut sxx, mut sxy) = (0.0, 0.0, 0.0, 0.0);
            for (i, y) in values.iter().enumerate() {
                let x = i as f64;
                sx += x;
                sy += y;
                sxx += x * x;
                sxy += x * y;
            }
            Ok(precision((len * sxy - sx * sy) / (len * sxx - sx * sx)))
        })
        .with_fields(calc.fields().iter().cloned()))
    }

    /// Population standard deviation. A flat or undefined series reports 1.
    pub fn stdev(&self, n: f64, calc: &Calc) -> Result<Calc, LookbackError> {
        let n = positive_integer(n, "STDEV")?;
        let inner = calc.clone();
        Ok(Calc::new(calc.warm_up().plus(n).minus(1), move |bars| {
            let prices = values(n, &inner, bars)?;
            let avg = sum(&prices) / prices.len() as f64;
            let squares: Vec<f64> = prices.iter().map(|p| (p - avg) * (p - avg)).collect();
            let sd = (sum(&squares) / prices.len().max(1) as f64).sqrt();
            Ok(if sd == 0.0 || sd.is_nan() {
                1.0
            } else {
                precision(sd)
            })
        })
        .with_fields(calc.fields().iter().cloned()))
    }

    /// Wilder-smoothed relative strength index.
    pub fn rsi(&self, n: f64, calc: &Calc) -> Result<Calc, LookbackError> {
        let n = positive_integer(n, "RSI")?;
        let samples = n.saturating_add(self.settings().rsi_lookback);
        let inner = calc.clone();
        Ok(Calc::new(calc.warm_up().plus(samples), move |bars| {
            let values = values(samples, &inner, bars)?;
            let changes: Vec<f64> = values.windows(2).map(|p| p[1] - p[0]).collect();
            let gains: Vec<f64> = changes.iter().map(|c| c.max(0.0)).collect();
            let losses: Vec<f64> = changes.iter().map(|c| c.min(0.0)).collect();
            let gain = wilder(&gains, n);
            let loss = wilder(&losses, n);
            if loss == 0.0 {
                return Ok(100.0);
            }
            Ok(precision(100.0 - 100.0 / (1.0 - gain / loss)))
        })
        .with_fields(calc.fields().iter().cloned()))
    }
}

/// Mean of the first `n` values, then smoothed by `(n - 1) / n` over the rest.
fn wilder(values: &[f64], n: usize) -> f64 {
    let (first, rest) = values.split_at(n.min(values.len()));
    let seed = sum(first) / first.len() as f64;
    let n = n as f64;
    rest.iter().fold(seed, |smoothed, v| (smoothed * (n - 1.0) + v) / n)
}

fn finite_or_nan(value: f64) -> f64 {
    if value.is_finite() { value } else { f64::NAN }
}
