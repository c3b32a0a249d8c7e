//! TTL Cache - A thread-safe in-process cache
//!
//! Provides a map-like cache with per-entry TTL expiration, optional LRU
//! eviction, and one background sweeper shared by every cache in the process.

pub mod cache;
pub mod config;
pub mod error;
pub mod tasks;

pub use cache::{CacheStats, TtlCache};
pub use config::{CacheConfig, Config};
pub use error::{CacheError, Result};
pub use tasks::{is_shut_down, registered_caches, shutdown};
