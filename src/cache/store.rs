//! Cache Store Module
//!
//! Main cache engine combining the concurrent entry store with LRU tracking
//! and TTL expiration.
//!
//! # Lock discipline
//! The LRU list sits behind one mutex per cache. Lock order is always
//! "LRU mutex, then store shard": a thread holding a store shard guard only
//! ever *tries* the mutex, so the two cannot deadlock.
//!
//! Inserting a new key and every removal happen with the mutex held, so
//! while it is held each stored entry has exactly one linked node. Recency
//! touches from `get` and from `put` on an existing key are opportunistic:
//! under contention they are skipped, so recency may lag but membership and
//! expiry never depend on winning the mutex.
//!
//! Keys and values leaving the cache are handed out of the critical section
//! before they are dropped or compared, so their `Drop` and `PartialEq` may
//! call back into the same cache.

use std::borrow::Borrow;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::trace;

use crate::cache::entry::CacheEntry;
use crate::cache::lru::LruList;
use crate::cache::stats::{CacheStats, StatsCounters};
use crate::tasks::Sweep;

/// Entries taken out of the store, with the keys their list nodes held.
type Detached<K, V> = Vec<(K, CacheEntry<V>, Option<K>)>;

// == Cache Core ==
/// Shared state behind a `TtlCache`; the sweeper holds only a weak handle to it.
pub(crate) struct CacheCore<K, V> {
    /// Lifespan of every entry
    ttl: Duration,
    /// LRU capacity bound, None = unbounded
    max_size: Option<usize>,
    /// Key-value storage
    entries: DashMap<K, CacheEntry<V>>,
    /// Recency order
    lru: Mutex<LruList<K>>,
    /// Stored entries; only changed with the LRU mutex held
    count: AtomicUsize,
    /// Source of insertion sequence numbers
    next_seq: AtomicU64,
    /// Performance statistics
    stats: StatsCounters,
}

impl<K, V> CacheCore<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    // == Constructor ==
    pub fn new(ttl: Duration, max_size: Option<usize>) -> Self {
        Self {
            ttl,
            max_size,
            entries: DashMap::new(),
            lru: Mutex::new(LruList::new()),
            count: AtomicUsize::new(0),
            next_seq: AtomicU64::new(0),
            stats: StatsCounters::default(),
        }
    }

    // == Put ==
    /// Stores a value with a fresh expiry, replacing any previous entry.
    ///
    /// Returns the value previously stored under the key, even if it had
    /// expired without being removed yet.
    pub fn put(&self, key: K, value: V) -> Option<V> {
        let expires_at = Instant::now() + self.ttl;
        self.stats.record_insertion();

        // Existing key: replace in place, touch only if the mutex is free
        if let Some(mut entry) = self.entries.get_mut(&key) {
            let (previous, _) = entry.replace(value, expires_at);
            if let Some(mut lru) = self.lru.try_lock() {
                lru.move_to_tail(entry.node);
            }
            return Some(previous);
        }

        // New key: link and enforce capacity in one critical section
        let mut lru = self.lru.lock();
        let previous = match self.entries.entry(key) {
            Entry::Occupied(mut occupied) => {
                // Lost a race with another writer of the same key
                let node = occupied.get().node;
                let (previous, _) = occupied.get_mut().replace(value, expires_at);
                lru.move_to_tail(node);
                Some(previous)
            }
            Entry::Vacant(vacant) => {
                let node = lru.insert_at_tail(vacant.key().clone());
                let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                vacant.insert(CacheEntry::new(value, expires_at, node, seq));
                self.count.fetch_add(1, Ordering::Relaxed);
                None
            }
        };
        let evicted = self.evict_overflow(&mut lru);
        drop(lru);
        drop(evicted);
        previous
    }

    // == Evict Overflow ==
    /// Detaches least recently used entries until the store fits `max_size`.
    ///
    /// The caller drops the returned entries once the mutex is released.
    fn evict_overflow(&self, lru: &mut LruList<K>) -> Detached<K, V> {
        let mut evicted = Vec::new();
        let Some(max_size) = self.max_size else {
            return evicted;
        };
        while self.count.load(Ordering::Relaxed) > max_size {
            let Some(node_key) = lru.pop_front() else {
                break;
            };
            if let Some((key, entry)) = self.entries.remove(&node_key) {
                self.count.fetch_sub(1, Ordering::Relaxed);
                self.stats.record_eviction();
                trace!(max_size, "evicted least recently used entry");
                evicted.push((key, entry, Some(node_key)));
            }
        }
        evicted
    }

    // == Get ==
    /// Returns the value if present and unexpired.
    ///
    /// A found-but-expired entry is removed on the spot (lazy expiry).
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = Instant::now();
        match self.entries.get(key) {
            None => {
                self.stats.record_miss();
                return None;
            }
            Some(entry) => {
                if !entry.is_expired(now) {
                    if let Some(mut lru) = self.lru.try_lock() {
                        lru.move_to_tail(entry.node);
                    }
                    self.stats.record_hit();
                    return Some(entry.value.clone());
                }
            }
        }

        self.remove_expired(key, now);
        self.stats.record_miss();
        None
    }

    // == Peek ==
    /// Reads a live value without touching recency or statistics.
    pub fn peek<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.clone())
    }

    // == Time To Live ==
    /// Remaining lifespan of a live entry.
    pub fn ttl_remaining<Q>(&self, key: &Q) -> Option<Duration>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.ttl_remaining(now))
    }

    // == Contains Key ==
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            None => return false,
            Some(entry) => entry.is_expired(now),
        };
        if expired {
            self.remove_expired(key, now);
        }
        !expired
    }

    // == Contains Value ==
    /// Compares against a copy of the live values, outside every guard.
    pub fn contains_value(&self, value: &V) -> bool
    where
        V: PartialEq,
    {
        let now = Instant::now();
        let live: Vec<V> = self
            .entries
            .iter()
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.clone())
            .collect();
        live.iter().any(|candidate| candidate == value)
    }

    // == Remove ==
    /// Removes an entry, blocking on the LRU mutex.
    ///
    /// Returns the stored value, even if it had expired without being
    /// removed yet.
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = Instant::now();
        let (_key, removed, _node_key) = {
            let mut lru = self.lru.lock();
            let (key, entry) = self.entries.remove(key)?;
            self.count.fetch_sub(1, Ordering::Relaxed);
            let node_key = lru.unlink(entry.node);
            (key, entry, node_key)
        };

        if removed.is_expired(now) {
            self.stats.record_expirations(1);
        }
        Some(removed.value)
    }

    /// Removes the entry only if it is still expired, so a concurrent fresh
    /// `put` of the same key survives.
    fn remove_expired<Q>(&self, key: &Q, now: Instant) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let removed = {
            let mut lru = self.lru.lock();
            self.entries
                .remove_if(key, |_, entry| entry.is_expired(now))
                .map(|(key, entry)| {
                    self.count.fetch_sub(1, Ordering::Relaxed);
                    let node_key = lru.unlink(entry.node);
                    (key, entry, node_key)
                })
        };

        let found = removed.is_some();
        if found {
            self.stats.record_expirations(1);
        }
        found
    }

    // == Cleanup Expired ==
    /// Removes all expired entries from the cache.
    ///
    /// Returns the number of entries removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let expired_keys: Vec<K> = self
            .entries
            .iter()
            .filter(|entry| entry.is_expired(now))
            .map(|entry| entry.key().clone())
            .collect();

        if expired_keys.is_empty() {
            return 0;
        }

        let removed: Detached<K, V> = {
            let mut lru = self.lru.lock();
            expired_keys
                .iter()
                .filter_map(|key| self.entries.remove_if(key, |_, entry| entry.is_expired(now)))
                .map(|(key, entry)| {
                    self.count.fetch_sub(1, Ordering::Relaxed);
                    let node_key = lru.unlink(entry.node);
                    (key, entry, node_key)
                })
                .collect()
        };

        let count = removed.len();
        self.stats.record_expirations(count as u64);
        count
    }

    // == Clear ==
    /// Empties the store and resets the list to its two sentinels.
    pub fn clear(&self) {
        let mut lru = self.lru.lock();
        // New keys wait on the mutex, so these are all the stored keys
        let keys: Vec<K> = self.entries.iter().map(|entry| entry.key().clone()).collect();
        let removed: Vec<(K, CacheEntry<V>)> = keys
            .iter()
            .filter_map(|key| self.entries.remove(key))
            .collect();
        self.count.fetch_sub(removed.len(), Ordering::Relaxed);
        let nodes = std::mem::replace(&mut *lru, LruList::new());
        drop(lru);

        drop((keys, removed, nodes));
    }

    // == Snapshot ==
    /// Live entries in insertion order.
    pub fn snapshot(&self) -> Vec<(K, V)> {
        let now = Instant::now();
        let mut live: Vec<(u64, K, V)> = self
            .entries
            .iter()
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| (entry.seq, entry.key().clone(), entry.value.clone()))
            .collect();
        live.sort_unstable_by_key(|(seq, _, _)| *seq);
        live.into_iter().map(|(_, key, value)| (key, value)).collect()
    }

    // == Length ==
    /// Number of stored entries, including expired ones not yet removed.
    ///
    /// Exceeds `max_size` by at most one, and only while a new key is being
    /// inserted.
    pub fn len(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // == Stats ==
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot(self.len())
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn max_size(&self) -> Option<usize> {
        self.max_size
    }

    /// Keys from least to most recently used.
    #[cfg(test)]
    pub fn lru_keys(&self) -> Vec<K> {
        self.lru.lock().iter().cloned().collect()
    }

    /// Number of linked nodes.
    #[cfg(test)]
    pub fn linked_len(&self) -> usize {
        self.lru.lock().len()
    }
}

impl<K, V> Sweep for CacheCore<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn purge_expired(&self) -> usize {
        CacheCore::purge_expired(self)
    }
}
