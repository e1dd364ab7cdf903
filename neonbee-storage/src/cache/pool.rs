//! Registry of per-producer-type caches.

use super::store::ProducerCache;
use neonbee_core::{CacheConfig, NeonBeeResult, RegistryError};
use std::any::{type_name, Any};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

struct PoolEntry {
    cache: Arc<dyn Any + Send + Sync>,
    value_type: &'static str,
    registrations: usize,
}

/// Owner of the in-memory caches of all cached producers of a node.
///
/// A cache is created when the first producer of a type registers and torn
/// down when the last one unregisters. Later registrations of the same type
/// share the existing cache and its configuration.
#[derive(Default)]
pub struct CachePool {
    entries: Mutex<HashMap<String, PoolEntry>>,
}

impl CachePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one producer instance and return the cache of its type.
    ///
    /// Fails with `RegistryError::AlreadyRegistered` if the producer type is
    /// already registered with a different value type.
    pub fn register<V>(
        &self,
        producer_type: &str,
        config: &CacheConfig,
    ) -> NeonBeeResult<Arc<ProducerCache<V>>>
    where
        V: Clone + Send + Sync + 'static,
    {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(entry) = entries.get_mut(producer_type) {
            let cache = Arc::clone(&entry.cache)
                .downcast::<ProducerCache<V>>()
                .map_err(|_| RegistryError::AlreadyRegistered {
                    kind: "Producer type".to_string(),
                    id: format!("{} (caching {})", producer_type, entry.value_type),
                })?;
            entry.registrations += 1;
            return Ok(cache);
        }

        config.validate()?;
        let cache = Arc::new(ProducerCache::<V>::new(producer_type, config));
        entries.insert(
            producer_type.to_string(),
            PoolEntry {
                cache: Arc::clone(&cache) as Arc<dyn Any + Send + Sync>,
                value_type: type_name::<V>(),
                registrations: 1,
            },
        );
        tracing::debug!(
            producer_type = %producer_type,
            lifetime_ms = config.cache_lifetime.as_millis() as u64,
            max_capacity = config.max_capacity,
            "Producer cache created"
        );
        Ok(cache)
    }

    /// Unregister one producer instance. Returns true if this tore the
    /// cache down.
    pub fn unregister(&self, producer_type: &str) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let Some(entry) = entries.get_mut(producer_type) else {
            return false;
        };

        entry.registrations = entry.registrations.saturating_sub(1);
        if entry.registrations > 0 {
            return false;
        }
        entries.remove(producer_type);
        tracing::debug!(producer_type = %producer_type, "Producer cache torn down");
        true
    }

    pub fn contains(&self, producer_type: &str) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(producer_type)
    }

    /// Number of live producer instances of a type.
    pub fn registrations(&self, producer_type: &str) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(producer_type)
            .map_or(0, |entry| entry.registrations)
    }

    pub fn producer_types(&self) -> Vec<String> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let mut types: Vec<String> = entries.keys().cloned().collect();
        types.sort();
        types
    }
}

impl std::fmt::Debug for CachePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachePool")
            .field("producer_types", &self.producer_types())
            .finish()
    }
}
