//! NeonBee Test Utilities
//!
//! Centralized test infrastructure for the NeonBee workspace:
//! - Counting producers with delay and failure injection
//! - In-memory buffers and flaky shared data for failure paths
//! - Proptest generators for node ids and registry values
//! - Test fixtures for common scenarios
//! - Custom assertions for NeonBee-specific validation

// Re-export core types for convenience
pub use neonbee_core::{
    AsyncMap, BufferError, CacheConfig, CacheKey, DataContext, DataMap, DataQuery, DataRequest,
    LockProvider, NeonBeeError, NeonBeeResult, NodeId, RegistryConfig, SharedData,
    SharedDataError, ValueSet,
};
pub use neonbee_storage::{
    CachePool, CachedProducer, CachingDataSource, DataBuffer, LocalCluster, LocalClusterNode,
    LocalSharedData,
};

use async_trait::async_trait;
use neonbee_core::{Acquired, DataError, Lock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// MOCK PRODUCER
// ============================================================================

/// Producer that counts every phase and returns `"{path}#{n}"`, where `n`
/// is the number of the production.
#[derive(Debug)]
pub struct CountingProducer {
    producer_type: String,
    delay: Duration,
    fail: AtomicBool,
    fail_notifications: AtomicBool,
    bypass: bool,
    requires: AtomicUsize,
    retrievals: AtomicUsize,
    notifications: AtomicUsize,
}

impl CountingProducer {
    pub fn new(producer_type: impl Into<String>) -> Self {
        Self {
            producer_type: producer_type.into(),
            delay: Duration::ZERO,
            fail: AtomicBool::new(false),
            fail_notifications: AtomicBool::new(false),
            bypass: false,
            requires: AtomicUsize::new(0),
            retrievals: AtomicUsize::new(0),
            notifications: AtomicUsize::new(0),
        }
    }

    /// Sleep this long inside every production.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Compute no cache key, so every request bypasses caching.
    pub fn bypassing(mut self) -> Self {
        self.bypass = true;
        self
    }

    /// Make productions fail (or succeed again).
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Make the post-retrieval hook fail (or succeed again).
    pub fn set_failing_notifications(&self, fail: bool) {
        self.fail_notifications.store(fail, Ordering::SeqCst);
    }

    pub fn requires(&self) -> usize {
        self.requires.load(Ordering::SeqCst)
    }

    pub fn retrievals(&self) -> usize {
        self.retrievals.load(Ordering::SeqCst)
    }

    pub fn notifications(&self) -> usize {
        self.notifications.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CachedProducer for CountingProducer {
    type Value = String;

    fn producer_type(&self) -> &str {
        &self.producer_type
    }

    async fn compute_cache_key(
        &self,
        query: &DataQuery,
        context: &DataContext,
    ) -> NeonBeeResult<Option<CacheKey>> {
        if self.bypass {
            return Ok(None);
        }
        CacheKey::for_request(query, context).map(Some)
    }

    async fn require_data_for_caching(
        &self,
        _query: &DataQuery,
        _context: &DataContext,
    ) -> NeonBeeResult<Vec<DataRequest>> {
        self.requires.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    }

    async fn retrieve_data_to_cache(
        &self,
        query: &DataQuery,
        _required: &DataMap,
        _context: &DataContext,
    ) -> NeonBeeResult<String> {
        let n = self.retrievals.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(DataError::ProductionFailed {
                producer: self.producer_type.clone(),
                reason: format!("production {n} failed"),
            }
            .into());
        }
        Ok(format!("{}#{}", query.uri_path, n))
    }

    async fn retrieved_data_to_cache(
        &self,
        _key: &CacheKey,
        _value: &String,
        _context: &DataContext,
    ) -> NeonBeeResult<()> {
        self.notifications.fetch_add(1, Ordering::SeqCst);
        if self.fail_notifications.load(Ordering::SeqCst) {
            return Err(DataError::ProductionFailed {
                producer: self.producer_type.clone(),
                reason: "post-retrieval hook failed".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// Run both phases of one request with a fresh context.
pub async fn request<P: CachedProducer>(
    source: &CachingDataSource<P>,
    query: &DataQuery,
) -> NeonBeeResult<P::Value> {
    request_in(source, query, &DataContext::new()).await
}

/// Run both phases of one request within `context`.
pub async fn request_in<P: CachedProducer>(
    source: &CachingDataSource<P>,
    query: &DataQuery,
    context: &DataContext,
) -> NeonBeeResult<P::Value> {
    source.require_data(query, context).await?;
    source.retrieve_data(query, &DataMap::new(), context).await
}

// ============================================================================
// MOCK BUFFER
// ============================================================================

/// In-memory [`DataBuffer`] with call counters and failure injection.
#[derive(Debug)]
pub struct MockBuffer<V> {
    values: Mutex<HashMap<CacheKey, V>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    write_delay: Duration,
}

impl<V> Default for MockBuffer<V> {
    fn default() -> Self {
        Self {
            values: Mutex::new(HashMap::new()),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            write_delay: Duration::ZERO,
        }
    }
}

impl<V: Clone> MockBuffer<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every write, before the value is stored.
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = delay;
        self
    }

    fn lock_values(&self) -> std::sync::MutexGuard<'_, HashMap<CacheKey, V>> {
        self.values.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn insert(&self, key: CacheKey, value: V) {
        self.lock_values().insert(key, value);
    }

    pub fn get(&self, key: &CacheKey) -> Option<V> {
        self.lock_values().get(key).cloned()
    }

    pub fn clear(&self) {
        self.lock_values().clear();
    }

    pub fn len(&self) -> usize {
        self.lock_values().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn set_failing_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_failing_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl<V> DataBuffer<V> for MockBuffer<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn read_from_buffer(
        &self,
        key: &CacheKey,
        _context: &DataContext,
    ) -> NeonBeeResult<Option<V>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(BufferError::ReadFailed {
                reason: "injected read failure".to_string(),
            }
            .into());
        }
        match self.lock_values().get(key) {
            Some(value) => Ok(Some(value.clone())),
            None => Err(BufferError::NotFound {
                key: key.to_string(),
            }
            .into()),
        }
    }

    async fn write_to_buffer(
        &self,
        key: &CacheKey,
        value: &V,
        _context: &DataContext,
    ) -> NeonBeeResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if !self.write_delay.is_zero() {
            tokio::time::sleep(self.write_delay).await;
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(BufferError::WriteFailed {
                reason: "injected write failure".to_string(),
            }
            .into());
        }
        self.lock_values().insert(key.clone(), value.clone());
        Ok(())
    }
}

// ============================================================================
// FLAKY SHARED DATA
// ============================================================================

/// [`SharedData`] over [`LocalSharedData`] whose map writes can be made to
/// fail. Reads and locks keep working, so registry contents stay visible
/// while cleanups fail.
#[derive(Debug, Default)]
pub struct FlakySharedData {
    inner: LocalSharedData,
    fail_writes: Arc<AtomicBool>,
}

impl FlakySharedData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl LockProvider for FlakySharedData {
    async fn acquire_lock(&self, name: &str, timeout: Duration) -> NeonBeeResult<Lock<Acquired>> {
        self.inner.acquire_lock(name, timeout).await
    }
}

#[async_trait]
impl SharedData for FlakySharedData {
    async fn async_map(&self, name: &str) -> NeonBeeResult<Arc<dyn AsyncMap>> {
        Ok(Arc::new(FlakyMap {
            inner: self.inner.async_map(name).await?,
            fail_writes: Arc::clone(&self.fail_writes),
        }))
    }
}

struct FlakyMap {
    inner: Arc<dyn AsyncMap>,
    fail_writes: Arc<AtomicBool>,
}

impl FlakyMap {
    fn check_writable(&self) -> NeonBeeResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SharedDataError::MapUnavailable {
                map: self.inner.name().to_string(),
                reason: "injected write failure".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl AsyncMap for FlakyMap {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn get(&self, key: &str) -> NeonBeeResult<Option<ValueSet>> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, values: ValueSet) -> NeonBeeResult<()> {
        self.check_writable()?;
        self.inner.put(key, values).await
    }

    async fn remove(&self, key: &str) -> NeonBeeResult<Option<ValueSet>> {
        self.check_writable()?;
        self.inner.remove(key).await
    }

    async fn clear(&self) -> NeonBeeResult<()> {
        self.check_writable()?;
        self.inner.clear().await
    }

    async fn entries(&self) -> NeonBeeResult<HashMap<String, ValueSet>> {
        self.inner.entries().await
    }

    async fn keys(&self) -> NeonBeeResult<HashSet<String>> {
        self.inner.keys().await
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for NeonBee cluster types.

    use super::*;
    use proptest::prelude::*;
    use serde_json::Value;

    /// Generate a node id that is valid for node-scoped registries.
    pub fn arb_node_id() -> impl Strategy<Value = NodeId> {
        "[a-z][a-z0-9-]{0,11}".prop_map(NodeId::from)
    }

    /// Generate a small set of distinct registry values.
    pub fn arb_value_set() -> impl Strategy<Value = ValueSet> {
        proptest::collection::btree_set("[a-z0-9]{1,6}", 1..5)
            .prop_map(|values| values.into_iter().map(Value::String).collect())
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;

    /// Cache configuration with a short lifetime and the given coalescing wait.
    pub fn short_lived_cache(lifetime: Duration, coalescing_timeout_ms: i64) -> CacheConfig {
        CacheConfig::default()
            .with_lifetime(lifetime)
            .with_coalescing_timeout(coalescing_timeout_ms)
    }

    /// Registry configuration with a short lock wait.
    pub fn fast_registry_config() -> RegistryConfig {
        RegistryConfig::default().with_lock_timeout(Duration::from_secs(2))
    }

    /// A cluster with the given members joined in order; the first leads.
    pub fn local_cluster(node_ids: &[&str]) -> (LocalCluster, Vec<LocalClusterNode>) {
        let cluster = LocalCluster::new();
        let nodes = node_ids.iter().map(|id| cluster.join(*id)).collect();
        (cluster, nodes)
    }

    /// A caching source for `producer` over fresh in-process collaborators.
    pub fn caching_source<P: CachedProducer>(
        producer: P,
        config: CacheConfig,
    ) -> NeonBeeResult<CachingDataSource<P>> {
        CachingDataSource::new(
            producer,
            Arc::new(CachePool::new()),
            Arc::new(LocalSharedData::new()),
            config,
        )
    }

    /// Query used by scenario tests.
    pub fn books_query() -> DataQuery {
        DataQuery::new("/books").with_parameter("$top", "5")
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Custom assertion functions for NeonBee-specific validation.

    use super::*;

    /// Assert that a NeonBeeResult failed in the producer.
    #[track_caller]
    pub fn assert_production_failed<T: std::fmt::Debug>(result: &NeonBeeResult<T>) {
        match result {
            Err(NeonBeeError::Data(DataError::ProductionFailed { .. })) => {}
            other => panic!("Expected ProductionFailed, got: {:?}", other),
        }
    }

    /// Assert that two value sets hold the same values, in any order.
    #[track_caller]
    pub fn assert_same_values(actual: &ValueSet, expected: &ValueSet) {
        let mut actual: Vec<String> = actual.iter().map(|v| v.to_string()).collect();
        let mut expected: Vec<String> = expected.iter().map(|v| v.to_string()).collect();
        actual.sort();
        expected.sort();
        assert_eq!(actual, expected, "value sets differ");
    }
}
