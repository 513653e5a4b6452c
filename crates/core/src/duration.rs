//! Human-readable durations for check intervals and timeouts.
//!
//! Supports:
//! - Unit suffixes: "30s", "5m", "1h", "2d"
//! - Compound values: "1h30m", "2m30s"
//! - Bare integers, read as seconds: "90"

use std::time::Duration;

use crate::error::{ConfigError, Result};

const SECS_PER_MINUTE: u64 = 60;
const SECS_PER_HOUR: u64 = 60 * SECS_PER_MINUTE;
const SECS_PER_DAY: u64 = 24 * SECS_PER_HOUR;

/// Parse a duration string.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidDuration`] for empty input, unknown units,
/// a unit without a number, or a value that overflows.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let input = input.trim();

    if input.is_empty() {
        return Err(ConfigError::invalid_duration(input, "duration cannot be empty"));
    }

    if let Ok(secs) = input.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total: u64 = 0;
    let mut current = String::new();

    for c in input.chars() {
        match c {
            '0'..='9' => current.push(c),
            's' | 'm' | 'h' | 'd' => {
                if current.is_empty() {
                    return Err(ConfigError::invalid_duration(
                        input,
                        format!("unit '{c}' has no value"),
                    ));
                }
                let value: u64 = current
                    .parse()
                    .map_err(|_| ConfigError::invalid_duration(input, "value out of range"))?;
                let unit = match c {
                    's' => 1,
                    'm' => SECS_PER_MINUTE,
                    'h' => SECS_PER_HOUR,
                    _ => SECS_PER_DAY,
                };
                total = value
                    .checked_mul(unit)
                    .and_then(|secs| total.checked_add(secs))
                    .ok_or_else(|| ConfigError::invalid_duration(input, "value out of range"))?;
                current.clear();
            }
            _ => {
                return Err(ConfigError::invalid_duration(
                    input,
                    format!("unexpected character '{c}'"),
                ));
            }
        }
    }

    if !current.is_empty() {
        return Err(ConfigError::invalid_duration(
            input,
            "trailing number without a unit",
        ));
    }

    Ok(Duration::from_secs(total))
}

/// Format a duration using the largest whole units, e.g. `1h30m`.
///
/// Sub-second precision is dropped; zero formats as `0s`.
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let mut secs = duration.as_secs();
    if secs == 0 {
        return "0s".to_string();
    }

    let mut out = String::new();
    for (unit, suffix) in [
        (SECS_PER_DAY, 'd'),
        (SECS_PER_HOUR, 'h'),
        (SECS_PER_MINUTE, 'm'),
        (1, 's'),
    ] {
        let count = secs / unit;
        if count > 0 {
            out.push_str(&count.to_string());
            out.push(suffix);
            secs %= unit;
        }
    }
    out
}
