//! Cache Entry Module
//!
//! Defines the value stored in the entry store: the cached value, its fixed
//! expiry and the handle of its node in the LRU list.

use std::time::{Duration, Instant};

use crate::cache::lru::NodeId;

// == Cache Entry ==
/// Represents a single cache entry with value and metadata.
#[derive(Debug, Clone)]
pub(crate) struct CacheEntry<V> {
    /// The stored value
    pub value: V,
    /// Absolute expiry, fixed at insertion and never extended by reads
    pub expires_at: Instant,
    /// Handle of this entry's node in the LRU list
    pub node: NodeId,
    /// Insertion sequence, drives enumeration order
    pub seq: u64,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    pub fn new(value: V, expires_at: Instant, node: NodeId, seq: u64) -> Self {
        Self {
            value,
            expires_at,
            node,
            seq,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry is expired once `now` reaches its expiry, so a value is only
    /// ever returned while `now < expires_at`.
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    // == Time To Live ==
    /// Returns the remaining lifespan, zero once expired.
    pub fn ttl_remaining(&self, now: Instant) -> Duration {
        self.expires_at.saturating_duration_since(now)
    }

    // == Replace ==
    /// Installs a new value and expiry, returning the previous value and expiry.
    ///
    /// The node handle and insertion sequence are kept.
    pub fn replace(&mut self, value: V, expires_at: Instant) -> (V, Instant) {
        let previous = std::mem::replace(&mut self.value, value);
        let previous_expiry = std::mem::replace(&mut self.expires_at, expires_at);
        (previous, previous_expiry)
    }
}
