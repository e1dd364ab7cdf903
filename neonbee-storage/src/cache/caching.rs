//! Caching and coalescing decorator around a [`CachedProducer`].
//!
//! # Request flow
//!
//! ```text
//! require_data:  key ─→ lookup ─ hit ─→ stash in volatile register, no sub-requests
//!                                └ miss ─→ producer.require_data_for_caching
//!
//! retrieve_data: key ─→ volatile register ─ hit ─→ filter ─→ return
//!                        └ miss ─→ coalescing lock (bounded wait, may fall back)
//!                                  ─→ lookup ─ hit ─→ release ─→ filter ─→ return
//!                                            └ miss ─→ produce ─→ store ─→ release
//!                                                      ─→ notify hook (lock holder only)
//!                                                      ─→ filter ─→ return
//! ```
//!
//! The lock only decides who is the authoritative producer. A caller whose
//! wait times out produces on its own and skips the notify hook, so it
//! cannot race the lock holder's write-through.

use super::pool::CachePool;
use super::store::ProducerCache;
use super::traits::{CacheStats, CachedProducer};
use neonbee_core::{
    CacheConfig, CacheKey, DataContext, DataMap, DataQuery, DataRequest, LockProvider,
    NeonBeeResult,
};
use std::fmt;
use std::sync::Arc;

/// A producer decorated with a shared in-memory cache and request coalescing.
pub struct CachingDataSource<P: CachedProducer> {
    producer: P,
    producer_type: String,
    cache: Arc<ProducerCache<P::Value>>,
    pool: Arc<CachePool>,
    locks: Arc<dyn LockProvider>,
    config: CacheConfig,
}

impl<P: CachedProducer> CachingDataSource<P> {
    /// Decorate `producer`, registering it with `pool`.
    ///
    /// The first instance of a producer type fixes the cache configuration
    /// used by all instances of that type. The registration is dropped
    /// together with the decorator.
    pub fn new(
        producer: P,
        pool: Arc<CachePool>,
        locks: Arc<dyn LockProvider>,
        config: CacheConfig,
    ) -> NeonBeeResult<Self> {
        let producer_type = producer.producer_type().to_string();
        let cache = pool.register::<P::Value>(&producer_type, &config)?;
        Ok(Self {
            producer,
            producer_type,
            cache,
            pool,
            locks,
            config,
        })
    }

    pub fn producer(&self) -> &P {
        &self.producer
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn producer_type(&self) -> &str {
        &self.producer_type
    }

    /// Requirement phase.
    ///
    /// On a cache hit the value is handed to the retrieval phase through the
    /// context's volatile register and no sub-requests are declared.
    pub async fn require_data(
        &self,
        query: &DataQuery,
        context: &DataContext,
    ) -> NeonBeeResult<Vec<DataRequest>> {
        let Some(key) = self.producer.compute_cache_key(query, context).await? else {
            return self.producer.require_data_for_caching(query, context).await;
        };

        if let Some(value) = self.lookup(&key, context).await {
            context
                .volatile_register()
                .stash(&self.producer_type, key, value);
            return Ok(Vec::new());
        }

        self.producer.require_data_for_caching(query, context).await
    }

    /// Retrieval phase. Producer errors are returned unchanged and never cached.
    pub async fn retrieve_data(
        &self,
        query: &DataQuery,
        required: &DataMap,
        context: &DataContext,
    ) -> NeonBeeResult<P::Value> {
        let Some(key) = self.producer.compute_cache_key(query, context).await? else {
            return self
                .producer
                .retrieve_data_to_cache(query, required, context)
                .await;
        };

        if let Some(value) = context
            .volatile_register()
            .take::<P::Value>(&self.producer_type, &key)
        {
            return Ok(self.producer.filter_data_from_cache(query, value, context).await);
        }

        let lock = match self.config.coalescing_timeout() {
            Some(timeout) => {
                let name = self.coalescing_lock_name(&key);
                match self.locks.acquire_lock(&name, timeout).await {
                    Ok(lock) => Some(lock),
                    Err(e) if e.is_coordination_failure() => {
                        tracing::debug!(
                            producer_type = %self.producer_type,
                            lock = %name,
                            error = %e,
                            "Coalescing lock not acquired, producing without it"
                        );
                        None
                    }
                    Err(e) => {
                        tracing::warn!(
                            producer_type = %self.producer_type,
                            lock = %name,
                            error = %e,
                            "Lock provider failed, producing without coalescing"
                        );
                        None
                    }
                }
            }
            None => None,
        };
        let responsible = lock.is_some() || !self.config.coalescing_enabled();

        if let Some(value) = self.lookup(&key, context).await {
            if let Some(lock) = lock {
                tracing::debug!(
                    producer_type = %self.producer_type,
                    lock = %lock.name(),
                    waited_ms = lock.data().waited.as_millis() as u64,
                    "Coalesced cache hit"
                );
                lock.release();
            }
            return Ok(self.producer.filter_data_from_cache(query, value, context).await);
        }

        // The lock, if held, is dropped on the error path.
        let value = self
            .producer
            .retrieve_data_to_cache(query, required, context)
            .await?;
        self.cache.put(key.clone(), value.clone());
        if let Some(lock) = lock {
            lock.release();
        }

        if responsible {
            if let Err(e) = self
                .producer
                .retrieved_data_to_cache(&key, &value, context)
                .await
            {
                tracing::warn!(
                    producer_type = %self.producer_type,
                    error = %e,
                    "Post-retrieval hook failed, returning produced value"
                );
            }
        }

        Ok(self.producer.filter_data_from_cache(query, value, context).await)
    }

    /// In-memory tier first, then the producer's secondary tier. A secondary
    /// hit is put back into memory.
    async fn lookup(&self, key: &CacheKey, context: &DataContext) -> Option<P::Value> {
        if let Some(value) = self.cache.get(key) {
            return Some(value);
        }
        let value = self.producer.read_secondary(key, context).await?;
        self.cache.put(key.clone(), value.clone());
        Some(value)
    }

    /// Name of the coalescing lock of a key.
    ///
    /// Built from a hash of the key, so unrelated keys may share a lock.
    /// That only costs unnecessary waiting; lookups use the full key.
    pub fn coalescing_lock_name(&self, key: &CacheKey) -> String {
        format!("{}-cache-{:016x}", self.producer_type, key.stable_hash())
    }

    // ------------------------------------------------------------------------
    // Direct in-memory primitives
    // ------------------------------------------------------------------------

    pub fn get(&self, key: &CacheKey) -> Option<P::Value> {
        self.cache.get(key)
    }

    pub fn put(&self, key: CacheKey, value: P::Value) {
        self.cache.put(key, value);
    }

    pub fn purge_all(&self) {
        self.cache.purge_all();
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

impl<P: CachedProducer> Drop for CachingDataSource<P> {
    fn drop(&mut self) {
        self.pool.unregister(&self.producer_type);
    }
}

impl<P: CachedProducer> fmt::Debug for CachingDataSource<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachingDataSource")
            .field("producer_type", &self.producer_type)
            .field("config", &self.config)
            .finish()
    }
}
