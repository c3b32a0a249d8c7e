//! Error types for the cache
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache.
///
/// Only construction can fail; once a cache exists its operations are infallible.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// TTL shorter than one millisecond
    #[error("TTL must be at least {min_ms} millisecond(s), got {ttl_ms}ms")]
    InvalidTtl { ttl_ms: u64, min_ms: u64 },

    /// Sweeper period below the busy-loop floor
    #[error("cleanup interval must be at least {min_ms} milliseconds, got {interval_ms}ms")]
    CleanupIntervalTooShort { interval_ms: u64, min_ms: u64 },

    /// Malformed configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_limit() {
        let err = CacheError::InvalidTtl { ttl_ms: 0, min_ms: 1 };
        assert_eq!(
            err.to_string(),
            "TTL must be at least 1 millisecond(s), got 0ms"
        );

        let err = CacheError::CleanupIntervalTooShort {
            interval_ms: 5,
            min_ms: 10,
        };
        assert!(err.to_string().contains("at least 10 milliseconds"));
        assert!(err.to_string().contains("5ms"));
    }
}
