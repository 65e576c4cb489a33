//! Error types for the cache
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Error observed by callers awaiting a cache entry.
///
/// `E` is the error type of the cache's lookup function. Lookup failures are
/// forwarded verbatim to every caller awaiting the same entry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError<E> {
    /// The lookup function failed
    #[error("Lookup failed: {0}")]
    Lookup(E),

    /// The lookup task ended before producing an outcome
    #[error("Lookup was interrupted before completing")]
    Interrupted,
}

impl<E> CacheError<E> {
    /// Returns true if the lookup never settled.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, CacheError::Interrupted)
    }
}

// == Config Error Enum ==
/// Error raised while reading configuration from the environment.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable holds a value that cannot be parsed
    #[error("Invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },
}

// == Result Type Alias ==
/// Convenience Result type for cache reads.
pub type Result<T, E> = std::result::Result<T, CacheError<E>>;
