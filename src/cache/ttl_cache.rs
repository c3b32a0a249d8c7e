//! TTL Cache Module
//!
//! The public cache type: a thread-safe map whose entries expire a fixed time
//! after insertion and, when bounded, are evicted least recently used first.

use std::borrow::Borrow;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tracing::debug;

use crate::cache::stats::CacheStats;
use crate::cache::store::CacheCore;
use crate::config::CacheConfig;
use crate::error::Result;
use crate::tasks::{self, Sweep, SweepHandle};

// == TTL Cache ==
/// A thread-safe cache with per-entry TTL and optional LRU capacity.
///
/// - Every entry lives exactly `ttl` from its most recent `put`; reads never
///   extend it. Expired entries are dropped when read and proactively by the
///   process-wide sweeper.
/// - With a `max_size`, inserting past capacity evicts the least recently
///   used entry. Under contention, `get` and `put` on an existing key skip
///   the recency update rather than wait for it, so recency may lag; entry
///   membership and expiry are unaffected.
/// - Enumeration (`keys`, `values`, `entries`, `iter`) follows insertion
///   order, not recency order.
///
/// The cache is not `Clone`; share it behind an `Arc`. Dropping the last
/// owner deregisters it from the sweeper.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use ttl_cache::TtlCache;
///
/// let cache = TtlCache::with_max_size(Duration::from_secs(60), 2).unwrap();
/// cache.put("a", 1);
/// cache.put("b", 2);
/// cache.get("a");
/// cache.put("c", 3); // evicts "b"
/// assert_eq!(cache.get("b"), None);
/// assert_eq!(cache.get("a"), Some(1));
/// ```
pub struct TtlCache<K, V> {
    core: Arc<CacheCore<K, V>>,
    cleanup_interval: Duration,
    sweep: SweepHandle,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    // == Constructors ==
    /// Unbounded cache swept every 60 seconds.
    pub fn new(ttl: Duration) -> Result<Self> {
        Self::with_config(CacheConfig::new(ttl))
    }

    /// LRU-bounded cache swept every 60 seconds.
    pub fn with_max_size(ttl: Duration, max_size: usize) -> Result<Self> {
        Self::with_config(CacheConfig::new(ttl).with_max_size(max_size))
    }

    /// Fails if the TTL is below one millisecond or the cleanup interval is
    /// below the sweeper floor.
    pub fn with_config(config: CacheConfig) -> Result<Self> {
        config.validate()?;

        let core = Arc::new(CacheCore::new(config.ttl(), config.max_size));
        let weak = Arc::downgrade(&core);
        let target: Weak<dyn Sweep> = weak;
        let sweep = tasks::register(target, config.cleanup_interval());

        debug!(
            sweep_id = sweep.id(),
            ttl_ms = config.ttl_ms,
            max_size = ?config.max_size,
            "Created cache"
        );

        Ok(Self {
            core,
            cleanup_interval: config.cleanup_interval(),
            sweep,
        })
    }

    // == Put ==
    /// Stores a value, replacing any previous one with a fresh expiry.
    ///
    /// Returns the value previously stored under the key. An expired value
    /// that no read or sweep has removed yet is still returned.
    ///
    /// Inserting a new key waits briefly for the recency list, since linking
    /// it and evicting past capacity happen together. Replacing an existing
    /// key never waits: if the list is busy, only the recency update is
    /// skipped.
    pub fn put(&self, key: K, value: V) -> Option<V> {
        self.core.put(key, value)
    }

    /// Puts every pair in order.
    pub fn put_all<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
    {
        for (key, value) in entries {
            self.core.put(key, value);
        }
    }

    // == Get ==
    /// Returns the value if present and unexpired, marking it recently used.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.core.get(key)
    }

    /// Returns a live value without marking it recently used.
    pub fn peek<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.core.peek(key)
    }

    /// Time left before a live entry expires.
    pub fn time_to_live<Q>(&self, key: &Q) -> Option<Duration>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.core.ttl_remaining(key)
    }

    // == Remove ==
    /// Removes an entry and returns its stored value, including an expired
    /// one that has not been removed yet.
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.core.remove(key)
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.core.contains_key(key)
    }

    pub fn contains_value(&self, value: &V) -> bool
    where
        V: PartialEq,
    {
        self.core.contains_value(value)
    }

    // == Length ==
    /// Number of stored entries.
    ///
    /// May count expired entries that neither a read nor the sweeper has
    /// removed yet. While a new key is being inserted into a full cache it
    /// can exceed `max_size` by one.
    pub fn len(&self) -> usize {
        self.core.len()
    }

    pub fn is_empty(&self) -> bool {
        self.core.is_empty()
    }

    pub fn clear(&self) {
        self.core.clear();
    }

    // == Views ==
    /// Snapshot of live keys in insertion order.
    pub fn keys(&self) -> Vec<K> {
        self.core.snapshot().into_iter().map(|(key, _)| key).collect()
    }

    /// Snapshot of live values in insertion order.
    pub fn values(&self) -> Vec<V> {
        self.core
            .snapshot()
            .into_iter()
            .map(|(_, value)| value)
            .collect()
    }

    /// Snapshot of live entries in insertion order.
    pub fn entries(&self) -> Vec<(K, V)> {
        self.core.snapshot()
    }

    /// Iterates over a snapshot of live entries in insertion order.
    ///
    /// [`Iter::remove`] removes the last yielded entry from the cache.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            cache: self,
            entries: self.core.snapshot().into_iter(),
            current: None,
        }
    }

    /// Removes every live entry for which `keep` returns false.
    pub fn retain<F>(&self, mut keep: F)
    where
        F: FnMut(&K, &V) -> bool,
    {
        for (key, value) in self.core.snapshot() {
            if !keep(&key, &value) {
                self.core.remove(&key);
            }
        }
    }

    // == Stats ==
    pub fn stats(&self) -> CacheStats {
        self.core.stats()
    }

    // == Settings ==
    pub fn ttl(&self) -> Duration {
        self.core.ttl()
    }

    pub fn max_size(&self) -> Option<usize> {
        self.core.max_size()
    }

    pub fn cleanup_interval(&self) -> Duration {
        self.cleanup_interval
    }

    #[cfg(test)]
    pub(crate) fn linked_len(&self) -> usize {
        self.core.linked_len()
    }
}

// == Snapshot Iterator ==
/// Iterator over a snapshot of a cache's entries.
pub struct Iter<'a, K, V> {
    cache: &'a TtlCache<K, V>,
    entries: std::vec::IntoIter<(K, V)>,
    current: Option<K>,
}

impl<K, V> Iter<'_, K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Removes the entry last returned by `next` from the cache.
    ///
    /// Returns None if nothing was yielded since the last removal, or if the
    /// entry is already gone.
    pub fn remove(&mut self) -> Option<V> {
        let key = self.current.take()?;
        self.cache.remove(&key)
    }
}

impl<K, V> Iterator for Iter<'_, K, V>
where
    K: Clone,
{
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        let (key, value) = self.entries.next()?;
        self.current = Some(key.clone());
        Some((key, value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

impl<'a, K, V> IntoIterator for &'a TtlCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    type Item = (K, V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// == Equality ==
/// Two caches are equal when their live entry sets are equal, regardless of
/// insertion or recency order.
impl<K, V> PartialEq for TtlCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + PartialEq + Send + Sync + 'static,
{
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        let mine = self.core.snapshot();
        let theirs: HashMap<K, V> = other.core.snapshot().into_iter().collect();
        mine.len() == theirs.len()
            && mine
                .iter()
                .all(|(key, value)| theirs.get(key) == Some(value))
    }
}

impl<K, V> Eq for TtlCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Eq + Send + Sync + 'static,
{
}

// Order-independent so that equal caches hash equally.
impl<K, V> Hash for TtlCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Hash + Send + Sync + 'static,
{
    fn hash<H: Hasher>(&self, state: &mut H) {
        let entries = self.core.snapshot();
        let combined = entries.iter().fold(0u64, |acc, entry| {
            let mut hasher = DefaultHasher::new();
            entry.hash(&mut hasher);
            acc.wrapping_add(hasher.finish())
        });
        state.write_usize(entries.len());
        state.write_u64(combined);
    }
}

impl<K, V> fmt::Debug for TtlCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + fmt::Debug + 'static,
    V: Clone + Send + Sync + fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.core.snapshot()).finish()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;
    use std::collections::HashSet;
    use std::thread::sleep;

    fn cache(max_size: usize) -> TtlCache<String, String> {
        TtlCache::with_max_size(Duration::from_secs(300), max_size).unwrap()
    }

    fn hash_of<T: Hash>(value: &T) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_construction_validates_config() {
        let result = TtlCache::<String, String>::new(Duration::ZERO);
        assert!(matches!(result, Err(CacheError::InvalidTtl { .. })));

        let config = CacheConfig::new(Duration::from_secs(1))
            .with_cleanup_interval(Duration::from_millis(5));
        let result = TtlCache::<String, String>::with_config(config);
        assert!(matches!(
            result,
            Err(CacheError::CleanupIntervalTooShort { .. })
        ));
    }

    #[test]
    fn test_settings_are_exposed() {
        let config = CacheConfig::new(Duration::from_millis(500))
            .with_max_size(7)
            .with_cleanup_interval(Duration::from_millis(20));
        let cache = TtlCache::<u32, u32>::with_config(config).unwrap();

        assert_eq!(cache.ttl(), Duration::from_millis(500));
        assert_eq!(cache.max_size(), Some(7));
        assert_eq!(cache.cleanup_interval(), Duration::from_millis(20));

        let unbounded = TtlCache::<u32, u32>::new(Duration::from_secs(1)).unwrap();
        assert_eq!(unbounded.max_size(), None);
        assert_eq!(unbounded.cleanup_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_put_get_remove_round_trip() {
        let cache = cache(10);

        assert_eq!(cache.put("k".to_string(), "v".to_string()), None);
        assert_eq!(cache.remove("k"), Some("v".to_string()));
        assert_eq!(cache.get("k"), None);
        assert!(!cache.contains_key("k"));
    }

    #[test]
    fn test_first_inserted_key_is_evicted() {
        let cache = cache(3);

        for key in ["a", "b", "c", "d"] {
            cache.put(key.to_string(), key.to_uppercase());
        }

        assert_eq!(cache.len(), 3);
        assert!(!cache.contains_key("a"));
        assert_eq!(cache.keys(), vec!["b", "c", "d"]);
    }

    #[test]
    fn test_get_promotes_least_recently_used() {
        let cache = cache(3);

        for key in ["a", "b", "c"] {
            cache.put(key.to_string(), key.to_string());
        }
        assert_eq!(cache.get("a"), Some("a".to_string()));
        cache.put("d".to_string(), "d".to_string());

        assert!(cache.contains_key("a"));
        assert!(!cache.contains_key("b"));
        assert_eq!(cache.core.lru_keys(), vec!["c", "a", "d"]);
    }

    #[test]
    fn test_peek_does_not_promote() {
        let cache = cache(2);

        cache.put("a".to_string(), "1".to_string());
        cache.put("b".to_string(), "2".to_string());
        assert_eq!(cache.peek("a"), Some("1".to_string()));
        cache.put("c".to_string(), "3".to_string());

        assert_eq!(cache.peek("a"), None);
        assert!(cache.time_to_live("b").is_some());
        assert_eq!(cache.time_to_live("a"), None);
    }

    #[test]
    fn test_lazy_expiry_without_sweep() {
        let cache = TtlCache::<String, u32>::new(Duration::from_millis(40)).unwrap();

        cache.put("k".to_string(), 1);
        assert_eq!(cache.get("k"), Some(1));

        sleep(Duration::from_millis(70));

        // Default sweep period is a minute, so only the lazy path can act here
        assert!(!cache.contains_key("k"));
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_views_skip_expired_entries() {
        let cache = TtlCache::<String, u32>::new(Duration::from_millis(40)).unwrap();

        cache.put("old".to_string(), 1);
        sleep(Duration::from_millis(70));
        cache.put("new".to_string(), 2);

        assert_eq!(cache.keys(), vec!["new"]);
        assert_eq!(cache.values(), vec![2]);
        assert_eq!(cache.entries(), vec![("new".to_string(), 2)]);
    }

    #[test]
    fn test_enumeration_follows_insertion_order() {
        let cache = cache(10);

        for key in ["x", "b", "m"] {
            cache.put(key.to_string(), format!("value_{}", key));
        }
        cache.get("x");

        let keys: Vec<String> = cache.iter().map(|(key, _)| key).collect();
        assert_eq!(keys, vec!["x", "b", "m"]);
        assert_eq!(
            cache.values(),
            vec!["value_x", "value_b", "value_m"]
        );
    }

    #[test]
    fn test_iterator_remove_routes_through_cache() {
        let cache = cache(10);
        cache.put_all((0..5).map(|i| (i.to_string(), i.to_string())));

        let mut iter = cache.iter();
        assert_eq!(iter.remove(), None);
        while let Some((key, _)) = iter.next() {
            if key == "1" || key == "3" {
                assert_eq!(iter.remove(), Some(key.clone()));
                assert_eq!(iter.remove(), None);
            }
        }

        assert_eq!(cache.keys(), vec!["0", "2", "4"]);
        assert_eq!(cache.linked_len(), 3);
    }

    #[test]
    fn test_retain() {
        let cache = cache(10);
        cache.put_all((0..6).map(|i| (i.to_string(), i.to_string())));

        cache.retain(|_, value| value.parse::<u32>().unwrap() % 2 == 0);

        assert_eq!(cache.keys(), vec!["0", "2", "4"]);
    }

    #[test]
    fn test_into_iterator_for_reference() {
        let cache = cache(10);
        cache.put("a".to_string(), "1".to_string());

        let mut seen = Vec::new();
        for (key, value) in &cache {
            seen.push((key, value));
        }
        assert_eq!(seen, vec![("a".to_string(), "1".to_string())]);
    }

    #[test]
    fn test_contains_value() {
        let cache = cache(10);
        cache.put("a".to_string(), "1".to_string());

        assert!(cache.contains_value(&"1".to_string()));
        assert!(!cache.contains_value(&"2".to_string()));
    }

    #[test]
    fn test_clear() {
        let cache = cache(10);
        cache.put("a".to_string(), "1".to_string());
        cache.put("b".to_string(), "2".to_string());

        cache.clear();

        assert!(cache.is_empty());
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.linked_len(), 0);
    }

    #[test]
    fn test_equality_ignores_order() {
        let first = cache(10);
        let second = cache(10);

        for key in ["a", "b", "c"] {
            first.put(key.to_string(), key.to_string());
        }
        for key in ["c", "a", "b"] {
            second.put(key.to_string(), key.to_string());
        }
        second.get("a");

        assert_eq!(first, second);
        assert_eq!(hash_of(&first), hash_of(&second));

        second.put("c".to_string(), "changed".to_string());
        assert_ne!(first, second);

        second.put("c".to_string(), "c".to_string());
        second.put("d".to_string(), "d".to_string());
        assert_ne!(first, second);
    }

    #[test]
    fn test_equal_caches_collapse_in_hash_set() {
        let first = cache(10);
        let second = cache(10);
        first.put("k".to_string(), "v".to_string());
        second.put("k".to_string(), "v".to_string());

        let mut set = HashSet::new();
        set.insert(hash_of(&first));
        set.insert(hash_of(&second));
        assert_eq!(set.len(), 1);
        assert_eq!(first, first);
    }

    #[test]
    fn test_debug_lists_entries_in_insertion_order() {
        let cache = cache(10);
        cache.put("b".to_string(), "2".to_string());
        cache.put("a".to_string(), "1".to_string());

        assert_eq!(format!("{:?}", cache), r#"{"b": "2", "a": "1"}"#);
    }

    #[test]
    fn test_drop_deregisters_from_sweeper() {
        let cache = cache(10);
        let id = cache.sweep.id();
        assert!(tasks::is_registered(id));

        drop(cache);

        assert!(!tasks::is_registered(id));
    }

    #[test]
    fn test_sweeper_removes_entries_without_reads() {
        let config = CacheConfig::new(Duration::from_millis(50))
            .with_cleanup_interval(Duration::from_millis(10));
        let cache = TtlCache::<String, String>::with_config(config).unwrap();

        cache.put("k".to_string(), "v".to_string());
        assert_eq!(cache.len(), 1);

        sleep(Duration::from_millis(150));

        assert_eq!(cache.len(), 0);
        assert_eq!(cache.linked_len(), 0);
        assert_eq!(cache.stats().expirations, 1);
    }
}
