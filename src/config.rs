//! Runtime configuration.
//!
//! Defaults match the built-in policy; each value can be overridden with an
//! `NFC_GUARD_*` environment variable.

use std::time::Duration;

use chrono::FixedOffset;
use thiserror::Error;

use crate::crypto::signature::{SigningSecret, DEFAULT_EXPIRY_WINDOW, DEFAULT_PAYLOAD_CAPACITY};
use crate::security::DetectorConfig;

pub const ENV_SECRET: &str = "NFC_GUARD_SECRET";
pub const ENV_EXPIRY_SECS: &str = "NFC_GUARD_EXPIRY_SECS";
pub const ENV_MAX_ACCESSES_PER_MINUTE: &str = "NFC_GUARD_MAX_ACCESSES_PER_MINUTE";
pub const ENV_MAX_LOCATIONS_PER_HOUR: &str = "NFC_GUARD_MAX_LOCATIONS_PER_HOUR";
pub const ENV_PAYLOAD_CAPACITY: &str = "NFC_GUARD_PAYLOAD_CAPACITY";
pub const ENV_PATTERN_WINDOW: &str = "NFC_GUARD_PATTERN_WINDOW";
pub const ENV_MAX_TRACKED_TAGS: &str = "NFC_GUARD_MAX_TRACKED_TAGS";
pub const ENV_ACQUIRE_TIMEOUT_SECS: &str = "NFC_GUARD_ACQUIRE_TIMEOUT_SECS";
pub const ENV_UTC_OFFSET_MINUTES: &str = "NFC_GUARD_UTC_OFFSET_MINUTES";

pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} has invalid value {value:?}")]
    InvalidValue { key: &'static str, value: String },
    #[error("{key} must be greater than zero")]
    Zero { key: &'static str },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SecurityConfig {
    pub detector: DetectorConfig,
    /// Signatures older than this are expired.
    pub expiry_window: Duration,
    /// Maximum length of a signed payload string in bytes.
    pub payload_capacity: usize,
    /// How long to wait for a tag before giving up.
    pub acquire_timeout: Duration,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            detector: DetectorConfig::default(),
            expiry_window: DEFAULT_EXPIRY_WINDOW,
            payload_capacity: DEFAULT_PAYLOAD_CAPACITY,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
        }
    }
}

impl SecurityConfig {
    /// Defaults overridden by any `NFC_GUARD_*` variables that are set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env`, with variables resolved through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(secs) = parse_positive::<u64, _>(&lookup, ENV_EXPIRY_SECS)? {
            config.expiry_window = Duration::from_secs(secs);
        }
        if let Some(n) = parse_positive(&lookup, ENV_MAX_ACCESSES_PER_MINUTE)? {
            config.detector.max_accesses_per_minute = n;
        }
        if let Some(n) = parse_positive(&lookup, ENV_MAX_LOCATIONS_PER_HOUR)? {
            config.detector.max_locations_per_hour = n;
        }
        if let Some(n) = parse_positive(&lookup, ENV_PAYLOAD_CAPACITY)? {
            config.payload_capacity = n;
        }
        if let Some(n) = parse_positive(&lookup, ENV_PATTERN_WINDOW)? {
            config.detector.window = n;
        }
        if let Some(n) = parse_positive(&lookup, ENV_MAX_TRACKED_TAGS)? {
            config.detector.max_tracked_tags = n;
        }
        if let Some(secs) = parse_positive::<u64, _>(&lookup, ENV_ACQUIRE_TIMEOUT_SECS)? {
            config.acquire_timeout = Duration::from_secs(secs);
        }
        if let Some(raw) = lookup(ENV_UTC_OFFSET_MINUTES) {
            config.detector.utc_offset = raw
                .trim()
                .parse::<i32>()
                .ok()
                .and_then(|minutes| minutes.checked_mul(60))
                .and_then(FixedOffset::east_opt)
                .ok_or(ConfigError::InvalidValue {
                    key: ENV_UTC_OFFSET_MINUTES,
                    value: raw,
                })?;
        }

        Ok(config)
    }
}

/// Signing secret from `NFC_GUARD_SECRET`, if set and non-empty.
pub fn signing_secret_from_env() -> Option<SigningSecret> {
    std::env::var(ENV_SECRET)
        .ok()
        .filter(|s| !s.is_empty())
        .map(SigningSecret::new)
}

fn parse_positive<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr + PartialEq + Default,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let value: T = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: raw.clone(),
    })?;
    if value == T::default() {
        return Err(ConfigError::Zero { key });
    }
    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = SecurityConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.expiry_window, Duration::from_secs(300));
        assert_eq!(config.payload_capacity, 200);
        assert_eq!(config.acquire_timeout, Duration::from_secs(10));
        assert_eq!(config.detector.max_accesses_per_minute, 3);
        assert_eq!(config.detector.max_locations_per_hour, 2);
        assert_eq!(config.detector.window, 20);
        assert_eq!(config.detector.max_tracked_tags, 256);
    }

    #[test]
    fn test_overrides() {
        let config = SecurityConfig::from_lookup(lookup(&[
            (ENV_EXPIRY_SECS, "60"),
            (ENV_MAX_ACCESSES_PER_MINUTE, "10"),
            (ENV_MAX_LOCATIONS_PER_HOUR, "4"),
            (ENV_PAYLOAD_CAPACITY, "500"),
            (ENV_PATTERN_WINDOW, "50"),
            (ENV_MAX_TRACKED_TAGS, "8"),
            (ENV_ACQUIRE_TIMEOUT_SECS, " 3 "),
            (ENV_UTC_OFFSET_MINUTES, "-300"),
        ]))
        .unwrap();

        assert_eq!(config.expiry_window, Duration::from_secs(60));
        assert_eq!(config.detector.max_accesses_per_minute, 10);
        assert_eq!(config.detector.max_locations_per_hour, 4);
        assert_eq!(config.payload_capacity, 500);
        assert_eq!(config.detector.window, 50);
        assert_eq!(config.detector.max_tracked_tags, 8);
        assert_eq!(config.acquire_timeout, Duration::from_secs(3));
        assert_eq!(config.detector.utc_offset.local_minus_utc(), -5 * 3600);
    }

    #[test]
    fn test_invalid_number() {
        let err = SecurityConfig::from_lookup(lookup(&[(ENV_EXPIRY_SECS, "five")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                key: ENV_EXPIRY_SECS,
                value: "five".to_string()
            }
        );
    }

    #[test]
    fn test_zero_rejected() {
        let err = SecurityConfig::from_lookup(lookup(&[(ENV_PATTERN_WINDOW, "0")])).unwrap_err();
        assert_eq!(err, ConfigError::Zero { key: ENV_PATTERN_WINDOW });
    }

    #[test]
    fn test_offset_out_of_range() {
        let result = SecurityConfig::from_lookup(lookup(&[(ENV_UTC_OFFSET_MINUTES, "2000")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }
}
