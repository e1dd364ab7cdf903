//! Time-expiring in-memory cache of one producer type.

use super::traits::CacheStats;
use moka::sync::Cache;
use neonbee_core::{CacheConfig, CacheKey};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// In-memory tier shared by all instances of one producer type.
///
/// Entries expire a fixed lifetime after insertion; replacing a value
/// restarts its lifetime. Writes are last-write-wins.
pub struct ProducerCache<V> {
    producer_type: String,
    entries: Cache<CacheKey, V>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V: Clone + Send + Sync + 'static> ProducerCache<V> {
    pub fn new(producer_type: impl Into<String>, config: &CacheConfig) -> Self {
        Self {
            producer_type: producer_type.into(),
            entries: Cache::builder()
                .max_capacity(config.max_capacity)
                .time_to_live(config.cache_lifetime)
                .build(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn producer_type(&self) -> &str {
        &self.producer_type
    }

    pub fn get(&self, key: &CacheKey) -> Option<V> {
        let value = self.entries.get(key);
        let counter = if value.is_some() {
            &self.hits
        } else {
            &self.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        value
    }

    pub fn put(&self, key: CacheKey, value: V) {
        self.entries.insert(key, value);
    }

    pub fn purge_all(&self) {
        self.entries.invalidate_all();
    }

    pub fn stats(&self) -> CacheStats {
        self.entries.run_pending_tasks();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count: self.entries.entry_count(),
        }
    }
}

impl<V> fmt::Debug for ProducerCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProducerCache")
            .field("producer_type", &self.producer_type)
            .field("hits", &self.hits.load(Ordering::Relaxed))
            .field("misses", &self.misses.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn key(s: &str) -> CacheKey {
        CacheKey::from_string(s)
    }

    #[test]
    fn test_get_put_purge() {
        let cache = ProducerCache::<String>::new("books", &CacheConfig::default());
        assert_eq!(cache.get(&key("a")), None);

        cache.put(key("a"), "alpha".to_string());
        assert_eq!(cache.get(&key("a")).as_deref(), Some("alpha"));

        cache.purge_all();
        assert_eq!(cache.get(&key("a")), None);
    }

    #[test]
    fn test_stats_count_hits_and_misses() {
        let cache = ProducerCache::<u32>::new("books", &CacheConfig::default());
        cache.put(key("a"), 1);
        cache.put(key("b"), 2);
        cache.get(&key("a"));
        cache.get(&key("a"));
        cache.get(&key("missing"));

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entry_count, 2);
    }

    #[test]
    fn test_entries_expire_after_lifetime() {
        let config = CacheConfig::default().with_lifetime(Duration::from_millis(50));
        let cache = ProducerCache::<u32>::new("books", &config);
        cache.put(key("a"), 1);
        assert_eq!(cache.get(&key("a")), Some(1));

        std::thread::sleep(Duration::from_millis(120));
        assert_eq!(cache.get(&key("a")), None);
    }
}
