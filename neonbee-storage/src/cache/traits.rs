//! Producer and buffer contracts of the caching layer.
//!
//! A producer implements the two-phase data contract: declare the
//! sub-requests it needs, then produce its value from their results. The
//! caching decorator calls the hooks below at fixed points of that flow.

use async_trait::async_trait;
use neonbee_core::{CacheKey, DataContext, DataMap, DataQuery, DataRequest, NeonBeeResult};

/// A data producer whose results can be cached and coalesced.
///
/// Only [`retrieve_data_to_cache`](CachedProducer::retrieve_data_to_cache)
/// must be implemented. Every other hook has the behaviour of an ordinary,
/// non-caching producer.
#[async_trait]
pub trait CachedProducer: Send + Sync + 'static {
    /// Produced value. Cloned out of the cache on every hit.
    type Value: Clone + Send + Sync + 'static;

    /// Stable identifier shared by every instance of this producer type.
    ///
    /// Instances with the same producer type share one in-memory cache and
    /// coalesce against each other.
    fn producer_type(&self) -> &str;

    /// Cache key of a request, or `None` to bypass caching and coalescing
    /// for this request only.
    ///
    /// Defaults to `(user identifier, query)`.
    async fn compute_cache_key(
        &self,
        query: &DataQuery,
        context: &DataContext,
    ) -> NeonBeeResult<Option<CacheKey>> {
        CacheKey::for_request(query, context).map(Some)
    }

    /// Sub-requests this producer depends on. Not called on a cache hit.
    async fn require_data_for_caching(
        &self,
        _query: &DataQuery,
        _context: &DataContext,
    ) -> NeonBeeResult<Vec<DataRequest>> {
        Ok(Vec::new())
    }

    /// Produce the value. Errors are returned to the caller and never cached.
    async fn retrieve_data_to_cache(
        &self,
        query: &DataQuery,
        required: &DataMap,
        context: &DataContext,
    ) -> NeonBeeResult<Self::Value>;

    /// Called after a fresh value was stored by the caller responsible for
    /// producing it. Awaited, but its outcome never changes the result.
    async fn retrieved_data_to_cache(
        &self,
        _key: &CacheKey,
        _value: &Self::Value,
        _context: &DataContext,
    ) -> NeonBeeResult<()> {
        Ok(())
    }

    /// Post-processing applied to every returned value. What is cached is
    /// never affected.
    async fn filter_data_from_cache(
        &self,
        _query: &DataQuery,
        value: Self::Value,
        _context: &DataContext,
    ) -> Self::Value {
        value
    }

    /// Second storage tier consulted when the in-memory cache misses.
    ///
    /// A value returned here is put back into the in-memory cache.
    async fn read_secondary(&self, _key: &CacheKey, _context: &DataContext) -> Option<Self::Value> {
        None
    }
}

/// Durable secondary store for produced values.
///
/// Failures of either operation never fail the request: reads fall back to
/// the producer and writes are logged.
#[async_trait]
pub trait DataBuffer<V>: Send + Sync + 'static {
    /// Buffered value for `key`. Both `Ok(None)` and
    /// `BufferError::NotFound` mean "nothing buffered".
    async fn read_from_buffer(&self, key: &CacheKey, context: &DataContext)
        -> NeonBeeResult<Option<V>>;

    async fn write_to_buffer(
        &self,
        key: &CacheKey,
        value: &V,
        context: &DataContext,
    ) -> NeonBeeResult<()>;
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of entries currently in cache.
    pub entry_count: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
        let stats = CacheStats {
            hits: 3,
            misses: 1,
            entry_count: 2,
        };
        assert!((stats.hit_rate() - 0.75).abs() < f64::EPSILON);
    }
}
