//! Cache Module
//!
//! Provides in-memory caching with TTL expiration and LRU eviction.

mod entry;
mod lru;
mod stats;
mod store;
mod ttl_cache;


// Re-export public types
pub use stats::CacheStats;
pub use ttl_cache::{Iter, TtlCache};

// == Public Constants ==
/// Shortest accepted TTL in milliseconds
pub const MIN_TTL_MS: u64 = 1;

/// Shortest accepted sweeper period in milliseconds
pub const MIN_CLEANUP_INTERVAL_MS: u64 = 10;

/// Sweeper period used when none is configured
pub const DEFAULT_CLEANUP_INTERVAL_MS: u64 = 60_000;
