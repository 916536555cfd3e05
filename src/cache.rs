//! TTL cache for slow external lookups
//!
//! Amortizes an expensive, idempotent lookup (spot price history) across
//! repeated queries for the same key within a freshness window. Entries are
//! never evicted proactively; an expired entry is masked on read, so a
//! caller cannot tell "expired" apart from "never set".
//!
//! Each key's expiry clock restarts at the most recent write for that key.
//! Safe for concurrent readers and writers across tasks.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

struct CacheEntry<V> {
    value: V,
    inserted: Instant,
}

/// Keyed store with a fixed per-entry time-to-live.
pub struct TtlCache<K, V> {
    timeout: Duration,
    entries: RwLock<HashMap<K, CacheEntry<V>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Create a cache whose entries are valid for `timeout` after each write.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// The configured freshness window.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Store `value` under `key`, stamping it with the current time.
    /// Overwrites any prior entry for the key and restarts its expiry clock.
    pub async fn insert(&self, key: K, value: V) {
        self.insert_at(key, value, Instant::now()).await;
    }

    /// Return the value for `key` if present and still fresh.
    ///
    /// An expired entry behaves exactly as if it was never set; it is
    /// dropped from the map as a side effect of being read.
    pub async fn get(&self, key: &K) -> Option<V> {
        self.get_at(key, Instant::now()).await
    }

    async fn insert_at(&self, key: K, value: V, now: Instant) {
        let mut entries = self.entries.write().await;
        entries.insert(key, CacheEntry { value, inserted: now });
    }

    async fn get_at(&self, key: &K, now: Instant) -> Option<V> {
        let mut entries = self.entries.write().await;
        let fresh = match entries.get(key) {
            Some(entry) => now.duration_since(entry.inserted) < self.timeout,
            None => return None,
        };
        if fresh {
            entries.get(key).map(|e| e.value.clone())
        } else {
            entries.remove(key);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_round_trip() {
        let cache = TtlCache::new(Duration::from_secs(1800));
        cache.insert("c5.4xlarge".to_string(), 0.31_f64).await;

        assert_eq!(cache.get(&"c5.4xlarge".to_string()).await, Some(0.31));
        assert_eq!(cache.get(&"p3.2xlarge".to_string()).await, None);
    }

    #[tokio::test]
    async fn test_expired_entry_behaves_as_absent() {
        let cache = TtlCache::new(Duration::from_secs(1800));
        let t0 = Instant::now();
        cache.insert_at("c5.4xlarge".to_string(), 0.31_f64, t0).await;

        // Just inside the window
        let fresh = cache
            .get_at(&"c5.4xlarge".to_string(), t0 + Duration::from_secs(1799))
            .await;
        assert_eq!(fresh, Some(0.31));

        // At the window boundary the entry is gone
        let stale = cache
            .get_at(&"c5.4xlarge".to_string(), t0 + Duration::from_secs(1800))
            .await;
        assert_eq!(stale, None);

        // And stays gone on subsequent reads
        assert_eq!(cache.get_at(&"c5.4xlarge".to_string(), t0).await, None);
    }

    #[tokio::test]
    async fn test_overwrite_restarts_expiry_clock() {
        let cache = TtlCache::new(Duration::from_secs(100));
        let t0 = Instant::now();
        cache.insert_at("k".to_string(), 1_u32, t0).await;

        // Rewrite at t0+90: clock restarts from the new write
        cache
            .insert_at("k".to_string(), 2_u32, t0 + Duration::from_secs(90))
            .await;

        let at_150 = cache
            .get_at(&"k".to_string(), t0 + Duration::from_secs(150))
            .await;
        assert_eq!(at_150, Some(2));

        let at_200 = cache
            .get_at(&"k".to_string(), t0 + Duration::from_secs(200))
            .await;
        assert_eq!(at_200, None);
    }

    #[tokio::test]
    async fn test_concurrent_readers_and_writers() {
        let cache = Arc::new(TtlCache::new(Duration::from_secs(60)));

        let mut handles = Vec::new();
        for i in 0..8_u32 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                for j in 0..100_u32 {
                    cache.insert(format!("key-{}", i % 4), i * 1000 + j).await;
                    let _ = cache.get(&format!("key-{}", (i + 1) % 4)).await;
                }
            }));
        }
        for handle in handles {
            handle.await.expect("cache task panicked");
        }

        // Every surviving key holds some complete write
        for i in 0..4_u32 {
            assert!(cache.get(&format!("key-{i}")).await.is_some());
        }
    }
}
