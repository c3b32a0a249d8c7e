//! Shutdown Tests
//!
//! Stopping the sweeper is irreversible and process-wide, so these tests live
//! in their own test binary and run as a single sequence.

use std::thread::sleep;
use std::time::Duration;

use ttl_cache::{CacheConfig, TtlCache};

fn swept_cache(ttl_ms: u64) -> TtlCache<String, String> {
    let config = CacheConfig::new(Duration::from_millis(ttl_ms))
        .with_cleanup_interval(Duration::from_millis(10));
    TtlCache::with_config(config).unwrap()
}

#[test]
fn test_shutdown_stops_sweeping_but_cache_stays_usable() {
    // Sweeper runs before shutdown
    let before = swept_cache(30);
    before.put("k".to_string(), "v".to_string());
    sleep(Duration::from_millis(120));
    assert!(before.is_empty());
    assert!(ttl_cache::registered_caches() >= 1);
    assert!(!ttl_cache::is_shut_down());

    ttl_cache::shutdown();
    ttl_cache::shutdown(); // idempotent

    assert!(ttl_cache::is_shut_down());
    assert_eq!(ttl_cache::registered_caches(), 0);

    // Existing cache: expired entries linger until read
    before.put("k".to_string(), "v".to_string());
    sleep(Duration::from_millis(120));
    assert_eq!(before.len(), 1);
    assert_eq!(before.get("k"), None);
    assert_eq!(before.len(), 0);

    // New caches are never scheduled but work normally
    let after = swept_cache(30);
    assert_eq!(ttl_cache::registered_caches(), 0);
    after.put("a".to_string(), "1".to_string());
    assert_eq!(after.get("a"), Some("1".to_string()));
    assert_eq!(after.remove("a"), Some("1".to_string()));

    after.put("b".to_string(), "2".to_string());
    sleep(Duration::from_millis(120));
    assert_eq!(after.len(), 1);
    assert!(!after.contains_key("b"));
    assert!(after.is_empty());
}
