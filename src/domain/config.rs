//! Builds the immutable [`Session`] and [`WindowSettings`] from configuration.

use crate::domain::error::LookbackError;
use crate::domain::session::Session;
use crate::domain::window::WindowSettings;
use crate::ports::config_port::ConfigPort;

const SESSION: &str = "session";
const CALC: &str = "calc";

pub fn session_from_config(config: &dyn ConfigPort) -> Result<Session, LookbackError> {
    let interval = required(config, SESSION, "interval")?;
    let opens = required(config, SESSION, "market_opens_at")?;
    let closes = required(config, SESSION, "market_closes_at")?;
    let tz = required(config, SESSION, "tz")?;
    let premarket = config
        .get_string(SESSION, "premarket_opens_at")
        .unwrap_or_else(|| opens.clone());
    let after_hours = config
        .get_string(SESSION, "after_hours_closes_at")
        .unwrap_or_else(|| closes.clone());
    Session::new(&interval, &opens, &closes, &tz)?.with_extended_hours(&premarket, &after_hours)
}

pub fn window_settings_from_config(
    config: &dyn ConfigPort,
) -> Result<WindowSettings, LookbackError> {
    let defaults = WindowSettings::default();
    Ok(WindowSettings {
        ema_multiplier: count(config, "ema_multiplier", defaults.ema_multiplier, 1)?,
        slope_multiplier: count(config, "slope_multiplier", defaults.slope_multiplier, 1)?,
        rsi_lookback: count(config, "rsi_lookback", defaults.rsi_lookback, 0)?,
    })
}

fn required(config: &dyn ConfigPort, section: &str, key: &str) -> Result<String, LookbackError> {
    config
        .get_string(section, key)
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| LookbackError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        })
}

fn count(
    config: &dyn ConfigPort,
    key: &str,
    default: usize,
    min: usize,
) -> Result<usize, LookbackError> {
    let default = i64::try_from(default).unwrap_or(i64::MAX);
    let value = config.get_int(CALC, key, default);
    usize::try_from(value)
        .ok()
        .filter(|&v| v >= min)
        .ok_or_else(|| LookbackError::ConfigInvalid {
            section: CALC.to_string(),
            key: key.to_string(),
            reason: format!("{key} must be at least {min}, not {value}"),
        })
}
