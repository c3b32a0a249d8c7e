//! Configuration Module
//!
//! Cache construction parameters and the load driver's environment configuration.

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::{DEFAULT_CLEANUP_INTERVAL_MS, MIN_CLEANUP_INTERVAL_MS, MIN_TTL_MS};
use crate::error::{CacheError, Result};

// == Cache Config ==
/// Construction-time parameters for a single cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Fixed lifespan of every entry, in milliseconds
    pub ttl_ms: u64,
    /// LRU capacity bound, None = unbounded
    #[serde(default)]
    pub max_size: Option<usize>,
    /// Sweeper period for this cache, in milliseconds
    #[serde(default = "default_cleanup_interval_ms")]
    pub cleanup_interval_ms: u64,
}

fn default_cleanup_interval_ms() -> u64 {
    DEFAULT_CLEANUP_INTERVAL_MS
}

impl CacheConfig {
    // == Constructor ==
    /// Unbounded cache with the default sweeper period.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl_ms: duration_to_ms(ttl),
            max_size: None,
            cleanup_interval_ms: DEFAULT_CLEANUP_INTERVAL_MS,
        }
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = Some(max_size);
        self
    }

    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval_ms = duration_to_ms(interval);
        self
    }

    // == Validate ==
    /// Rejects a TTL below one millisecond and a cleanup interval below the floor.
    pub fn validate(&self) -> Result<()> {
        if self.ttl_ms < MIN_TTL_MS {
            return Err(CacheError::InvalidTtl {
                ttl_ms: self.ttl_ms,
                min_ms: MIN_TTL_MS,
            });
        }
        if self.cleanup_interval_ms < MIN_CLEANUP_INTERVAL_MS {
            return Err(CacheError::CleanupIntervalTooShort {
                interval_ms: self.cleanup_interval_ms,
                min_ms: MIN_CLEANUP_INTERVAL_MS,
            });
        }
        Ok(())
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }
}

// Saturates instead of truncating for absurdly long durations.
fn duration_to_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// == Driver Config ==
/// Load driver configuration.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Parameters of the cache under load
    pub cache: CacheConfig,
    /// Number of concurrent worker tasks
    pub workers: usize,
    /// Number of distinct keys the workers draw from
    pub key_space: u64,
    /// Interval between statistics reports in milliseconds
    pub report_interval_ms: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `TTL_MS` - Entry TTL in milliseconds (default: 300000)
    /// - `MAX_SIZE` - LRU capacity, unset or negative = unbounded (default: unbounded)
    /// - `CLEANUP_INTERVAL_MS` - Sweeper period in milliseconds (default: 1000)
    /// - `WORKERS` - Concurrent worker tasks (default: 4)
    /// - `KEY_SPACE` - Distinct keys in the workload (default: 10000)
    /// - `REPORT_INTERVAL_MS` - Statistics report period (default: 1000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cache: CacheConfig {
                ttl_ms: env_or("TTL_MS", defaults.cache.ttl_ms),
                max_size: env::var("MAX_SIZE")
                    .ok()
                    .and_then(|v| v.parse::<i64>().ok())
                    .and_then(|v| usize::try_from(v).ok()),
                cleanup_interval_ms: env_or(
                    "CLEANUP_INTERVAL_MS",
                    defaults.cache.cleanup_interval_ms,
                ),
            },
            workers: env_or("WORKERS", defaults.workers),
            key_space: env_or("KEY_SPACE", defaults.key_space),
            report_interval_ms: env_or("REPORT_INTERVAL_MS", defaults.report_interval_ms),
        }
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache: CacheConfig {
                ttl_ms: 300_000,
                max_size: None,
                cleanup_interval_ms: 1_000,
            },
            workers: 4,
            key_space: 10_000,
            report_interval_ms: 1_000,
        }
    }
}
