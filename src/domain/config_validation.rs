//! Typed, range-checked reads of configuration values.
//!
//! Every reader returns the key's default when it is absent and
//! `ConfigInvalid` when it is present but unparseable or out of range, so a
//! typo never silently turns into a default.

use std::str::FromStr;

use chrono::NaiveDate;

use crate::domain::error::SigtraderError;
use crate::ports::config_port::ConfigPort;

pub(crate) fn invalid(section: &str, key: &str, reason: impl Into<String>) -> SigtraderError {
    SigtraderError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn parse_raw<T: FromStr>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    expected: &str,
) -> Result<Option<T>, SigtraderError> {
    match config.get_string(section, key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| invalid(section, key, format!("expected {}, got '{}'", expected, raw))),
    }
}

/// An integer that must be at least `min`.
pub fn read_usize(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: usize,
    min: usize,
) -> Result<usize, SigtraderError> {
    let value = parse_raw::<usize>(config, section, key, "a non-negative integer")?
        .unwrap_or(default);
    if value < min {
        return Err(invalid(section, key, format!("must be at least {}", min)));
    }
    Ok(value)
}

/// A finite number inside `[min, max]`.
pub fn read_f64(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
    min: f64,
    max: f64,
) -> Result<f64, SigtraderError> {
    let value = parse_raw::<f64>(config, section, key, "a number")?.unwrap_or(default);
    if !value.is_finite() || value < min || value > max {
        return Err(invalid(
            section,
            key,
            format!("must be between {} and {}", min, max),
        ));
    }
    Ok(value)
}

/// A strictly positive finite number no greater than `max`.
pub fn read_positive_f64(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
    max: f64,
) -> Result<f64, SigtraderError> {
    let value = read_f64(config, section, key, default, 0.0, max)?;
    if value <= 0.0 {
        return Err(invalid(section, key, "must be positive"));
    }
    Ok(value)
}

pub fn read_bool(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: bool,
) -> Result<bool, SigtraderError> {
    match config.get_string(section, key) {
        None => Ok(default),
        Some(raw) => match raw.trim().to_lowercase().as_str() {
            "" => Ok(default),
            "true" | "yes" | "1" => Ok(true),
            "false" | "no" | "0" => Ok(false),
            _ => Err(invalid(section, key, format!("expected a boolean, got '{}'", raw))),
        },
    }
}

pub fn read_date(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<NaiveDate>, SigtraderError> {
    match config.get_string(section, key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
            .map(Some)
            .map_err(|_| invalid(section, key, "expected YYYY-MM-DD")),
    }
}

/// Comma-separated list of integers, each at least `min`. Absent means
/// `default`; present but empty is an error.
pub fn read_usize_list(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: &[usize],
    min: usize,
) -> Result<Vec<usize>, SigtraderError> {
    let Some(raw) = config.get_string(section, key) else {
        return Ok(default.to_vec());
    };
    let values = raw
        .split(',')
        .map(|token| {
            token
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|&v| v >= min)
                .ok_or_else(|| {
                    invalid(
                        section,
                        key,
                        format!("'{}' is not an integer of at least {}", token.trim(), min),
                    )
                })
        })
        .collect::<Result<Vec<usize>, SigtraderError>>()?;
    Ok(values)
}

/// `start_date <= end_date` when both are set.
pub fn validate_date_range(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    section: &str,
) -> Result<(), SigtraderError> {
    match (start, end) {
        (Some(s), Some(e)) if s > e => Err(invalid(
            section,
            "start_date",
            "start_date must not be after end_date",
        )),
        _ => Ok(()),
    }
}
