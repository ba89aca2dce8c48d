//! Configuration management utilities
//!
//! Helpers for overlaying environment variables onto compiled-in defaults.
//! A variable that is unset yields `Ok(None)`; a variable that is set but
//! cannot be parsed is an error rather than being silently ignored.

use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while reading configuration from the environment
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Variable is set but its value does not parse
    #[error("Invalid value for {key}: '{value}' ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    /// Value parsed but is outside the accepted range
    #[error("Out of range for {key}: {reason}")]
    OutOfRange { key: String, reason: String },
}

/// Parse an environment variable into `T`
pub fn env_parse<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    parse_value(key, std::env::var(key).ok())
}

/// Read an environment variable holding a whole number of seconds
pub fn env_duration_secs(key: &str) -> Result<Option<Duration>, ConfigError> {
    let secs: Option<u64> = env_parse(key)?;
    match secs {
        Some(0) => Err(ConfigError::OutOfRange {
            key: key.to_string(),
            reason: "duration must be positive".to_string(),
        }),
        other => Ok(other.map(Duration::from_secs)),
    }
}

fn parse_value<T>(key: &str, raw: Option<String>) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = raw else {
        return Ok(None);
    };

    raw.trim()
        .parse::<T>()
        .map(Some)
        .map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.clone(),
            reason: e.to_string(),
        })
}
