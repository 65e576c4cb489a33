//! Configuration Module
//!
//! Handles loading cache configuration from environment variables.

use std::env;
use std::time::Duration;

use crate::cache::TimeToLive;
use crate::error::ConfigError;

const DEFAULT_CAPACITY: usize = 1000;
const DEFAULT_TTL_MS: u64 = 300_000;
const DEFAULT_CLEANUP_INTERVAL_MS: u64 = 1000;

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Maximum number of entries the cache retains
    pub capacity: usize,
    /// Lifetime of settled entries
    pub time_to_live: TimeToLive,
    /// Background cleanup task interval
    pub cleanup_interval: Duration,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// Missing or malformed values fall back to their defaults.
    ///
    /// # Environment Variables
    /// - `CACHE_CAPACITY` - Maximum cache entries (default: 1000)
    /// - `CACHE_TTL_MS` - Entry lifetime in milliseconds, or `infinite` (default: 300000)
    /// - `CLEANUP_INTERVAL_MS` - Cleanup frequency in milliseconds (default: 1000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            capacity: read_var("CACHE_CAPACITY", parse_number)
                .ok()
                .flatten()
                .unwrap_or(defaults.capacity),
            time_to_live: read_var("CACHE_TTL_MS", parse_ttl)
                .ok()
                .flatten()
                .unwrap_or(defaults.time_to_live),
            cleanup_interval: read_var("CLEANUP_INTERVAL_MS", parse_number)
                .ok()
                .flatten()
                .map(Duration::from_millis)
                .unwrap_or(defaults.cleanup_interval),
        }
    }

    /// Like [`Config::from_env`], but rejects malformed values.
    pub fn try_from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            capacity: read_var("CACHE_CAPACITY", parse_number)?.unwrap_or(defaults.capacity),
            time_to_live: read_var("CACHE_TTL_MS", parse_ttl)?.unwrap_or(defaults.time_to_live),
            cleanup_interval: read_var("CLEANUP_INTERVAL_MS", parse_number)?
                .map(Duration::from_millis)
                .unwrap_or(defaults.cleanup_interval),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            time_to_live: TimeToLive::from_millis(DEFAULT_TTL_MS),
            cleanup_interval: Duration::from_millis(DEFAULT_CLEANUP_INTERVAL_MS),
        }
    }
}

/// Reads `name`, returning `Ok(None)` when it is unset.
fn read_var<T>(name: &'static str, parse: fn(&str) -> Option<T>) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(value) => parse(value.trim())
            .map(Some)
            .ok_or(ConfigError::InvalidValue { name, value }),
        Err(_) => Ok(None),
    }
}

fn parse_number<T: std::str::FromStr>(value: &str) -> Option<T> {
    value.parse().ok()
}

fn parse_ttl(value: &str) -> Option<TimeToLive> {
    if value.eq_ignore_ascii_case("infinite") {
        return Some(TimeToLive::Infinite);
    }
    value.parse().ok().map(TimeToLive::from_millis)
}
