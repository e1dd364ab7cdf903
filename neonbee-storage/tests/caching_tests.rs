//! Coalescing and expiry behaviour of the caching decorator.

use async_trait::async_trait;
use neonbee_core::{
    Acquired, CacheConfig, CacheKey, DataContext, DataMap, DataQuery, Lock, LockProvider,
    NeonBeeResult,
};
use neonbee_storage::{Buffered, CachePool, CachingDataSource, LocalSharedData};
use neonbee_test_utils::assertions::assert_production_failed;
use neonbee_test_utils::fixtures::{books_query, caching_source, short_lived_cache};
use neonbee_test_utils::{request, request_in, CountingProducer, MockBuffer};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Lock provider that hands out one lock for every name.
struct SingleLock(LocalSharedData);

#[async_trait]
impl LockProvider for SingleLock {
    async fn acquire_lock(&self, _name: &str, timeout: Duration) -> NeonBeeResult<Lock<Acquired>> {
        self.0.acquire_lock("all-keys", timeout).await
    }
}

#[tokio::test]
async fn test_concurrent_misses_produce_once_under_lock() {
    let producer = CountingProducer::new("books").with_delay(Duration::from_millis(200));
    let source = caching_source(producer, CacheConfig::default().with_coalescing_timeout(5_000)).unwrap();
    let query = books_query();

    let (first, second) = tokio::join!(request(&source, &query), request(&source, &query));

    assert_eq!(first.unwrap(), "/books#1");
    assert_eq!(second.unwrap(), "/books#1");
    assert_eq!(source.producer().retrievals(), 1);
    assert_eq!(source.producer().notifications(), 1);
}

#[tokio::test]
async fn test_disabled_coalescing_produces_independently() {
    let producer = CountingProducer::new("books").with_delay(Duration::from_millis(100));
    let source = caching_source(producer, CacheConfig::default().without_coalescing()).unwrap();
    let query = books_query();

    let (first, second) = tokio::join!(request(&source, &query), request(&source, &query));

    assert!(first.is_ok());
    assert!(second.is_ok());
    assert_eq!(source.producer().retrievals(), 2);
    assert_eq!(source.producer().notifications(), 2);
}

#[tokio::test]
async fn test_negative_timeout_disables_coalescing() {
    let producer = CountingProducer::new("books").with_delay(Duration::from_millis(100));
    let source = caching_source(producer, CacheConfig::default().with_coalescing_timeout(-1)).unwrap();
    let query = books_query();

    let _ = tokio::join!(request(&source, &query), request(&source, &query));
    assert_eq!(source.producer().retrievals(), 2);
}

#[tokio::test]
async fn test_waiter_falls_back_when_holder_is_slow() {
    let producer = CountingProducer::new("books").with_delay(Duration::from_millis(300));
    let source = caching_source(producer, CacheConfig::default().with_coalescing_timeout(50)).unwrap();
    let query = books_query();

    let (first, second) = tokio::join!(request(&source, &query), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        request(&source, &query).await
    });

    assert!(first.is_ok());
    assert!(second.is_ok());
    assert_eq!(source.producer().retrievals(), 2);
    // Only the lock holder notifies.
    assert_eq!(source.producer().notifications(), 1);
}

#[tokio::test]
async fn test_instances_of_one_type_share_cache_and_coalesce() {
    let pool = Arc::new(CachePool::new());
    let locks: Arc<dyn LockProvider> = Arc::new(LocalSharedData::new());
    let config = CacheConfig::default().with_coalescing_timeout(5_000);
    let a = CachingDataSource::new(
        CountingProducer::new("books").with_delay(Duration::from_millis(100)),
        Arc::clone(&pool),
        Arc::clone(&locks),
        config.clone(),
    )
    .unwrap();
    let b = CachingDataSource::new(
        CountingProducer::new("books").with_delay(Duration::from_millis(100)),
        Arc::clone(&pool),
        Arc::clone(&locks),
        config,
    )
    .unwrap();
    let query = books_query();

    let (from_a, from_b) = tokio::join!(request(&a, &query), request(&b, &query));

    assert_eq!(from_a.unwrap(), from_b.unwrap());
    assert_eq!(a.producer().retrievals() + b.producer().retrievals(), 1);
    assert_eq!(pool.registrations("books"), 2);
}

#[tokio::test]
async fn test_next_lock_holder_produces_after_failed_peer() {
    let pool = Arc::new(CachePool::new());
    let locks: Arc<dyn LockProvider> = Arc::new(LocalSharedData::new());
    let config = CacheConfig::default().with_coalescing_timeout(5_000);
    let failing = CachingDataSource::new(
        CountingProducer::new("books").with_delay(Duration::from_millis(100)),
        Arc::clone(&pool),
        Arc::clone(&locks),
        config.clone(),
    )
    .unwrap();
    failing.producer().set_failing(true);
    let healthy = CachingDataSource::new(
        CountingProducer::new("books"),
        Arc::clone(&pool),
        Arc::clone(&locks),
        config,
    )
    .unwrap();
    let query = books_query();

    let (crashed, recovered) = tokio::join!(request(&failing, &query), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        request(&healthy, &query).await
    });

    // Best effort: the waiter finds nothing cached and produces itself.
    assert_production_failed(&crashed);
    assert_eq!(recovered.unwrap(), "/books#1");
    assert_eq!(healthy.producer().retrievals(), 1);
    assert_eq!(healthy.producer().notifications(), 1);
    assert_eq!(failing.producer().notifications(), 0);
}

#[tokio::test]
async fn test_cache_hit_skips_both_phases() {
    let source = caching_source(CountingProducer::new("books"), CacheConfig::default()).unwrap();
    let query = books_query();

    request(&source, &query).await.unwrap();
    for _ in 0..3 {
        assert_eq!(request(&source, &query).await.unwrap(), "/books#1");
    }

    assert_eq!(source.producer().requires(), 1);
    assert_eq!(source.producer().retrievals(), 1);
    let stats = source.stats();
    assert!(stats.hits >= 3);
    assert_eq!(stats.entry_count, 1);
}

#[tokio::test]
async fn test_expiry_triggers_exactly_one_reproduction() {
    let config = short_lived_cache(Duration::from_millis(500), 0);
    let source = caching_source(CountingProducer::new("books"), config).unwrap();
    let query = books_query();

    request(&source, &query).await.unwrap();
    request(&source, &query).await.unwrap();
    assert_eq!(source.producer().retrievals(), 1);

    tokio::time::sleep(Duration::from_millis(750)).await;
    assert_eq!(request(&source, &query).await.unwrap(), "/books#2");
    assert_eq!(request(&source, &query).await.unwrap(), "/books#2");

    assert_eq!(source.producer().requires(), 2);
    assert_eq!(source.producer().retrievals(), 2);
}

#[tokio::test]
async fn test_users_do_not_share_entries() {
    let source = caching_source(CountingProducer::new("books"), CacheConfig::default()).unwrap();
    let query = books_query();
    let principal = |user: &str| match json!({ "user": user }) {
        serde_json::Value::Object(map) => map,
        _ => unreachable!(),
    };

    let alice = DataContext::new().with_principal(principal("alice"));
    let bob = DataContext::new().with_principal(principal("bob"));

    assert_eq!(request_in(&source, &query, &alice).await.unwrap(), "/books#1");
    assert_eq!(request_in(&source, &query, &bob).await.unwrap(), "/books#2");
    assert_eq!(request(&source, &query).await.unwrap(), "/books#3");

    let alice_again = DataContext::new().with_principal(principal("alice"));
    assert_eq!(
        request_in(&source, &query, &alice_again).await.unwrap(),
        "/books#1"
    );
}

#[tokio::test]
async fn test_producer_errors_are_not_cached() {
    let source = caching_source(CountingProducer::new("books"), CacheConfig::default()).unwrap();
    let query = books_query();

    source.producer().set_failing(true);
    assert_production_failed(&request(&source, &query).await);

    source.producer().set_failing(false);
    assert_eq!(request(&source, &query).await.unwrap(), "/books#2");
    assert_eq!(source.producer().notifications(), 1);
}

#[tokio::test]
async fn test_volatile_register_is_request_scoped() {
    let source = caching_source(CountingProducer::new("books"), CacheConfig::default()).unwrap();
    let query = books_query();
    request(&source, &query).await.unwrap();

    let first = DataContext::new();
    let second = DataContext::new();
    source.require_data(&query, &first).await.unwrap();
    assert_eq!(first.volatile_register().len(), 1);

    source.purge_all();
    // The second request never went through the requirement phase, so it
    // cannot see the first request's stashed value.
    let fresh = source
        .retrieve_data(&query, &DataMap::new(), &second)
        .await
        .unwrap();
    assert_eq!(fresh, "/books#2");

    let stashed = source
        .retrieve_data(&query, &DataMap::new(), &first)
        .await
        .unwrap();
    assert_eq!(stashed, "/books#1");
    assert!(first.volatile_register().is_empty());
}

#[tokio::test]
async fn test_bypass_never_caches() {
    let source = caching_source(
        CountingProducer::new("books").bypassing(),
        CacheConfig::default(),
    )
    .unwrap();
    let query = books_query();

    assert_eq!(request(&source, &query).await.unwrap(), "/books#1");
    assert_eq!(request(&source, &query).await.unwrap(), "/books#2");
    assert_eq!(source.producer().notifications(), 0);

    let key = CacheKey::for_request(&query, &DataContext::new()).unwrap();
    assert_eq!(source.get(&key), None);
}

#[tokio::test]
async fn test_waiter_does_not_wait_for_holder_write_through() {
    let buffer = Arc::new(MockBuffer::<String>::new().with_write_delay(Duration::from_millis(500)));
    let producer = Buffered::new(
        CountingProducer::new("books").with_delay(Duration::from_millis(100)),
        Arc::clone(&buffer),
    );
    let source = caching_source(producer, CacheConfig::default().with_coalescing_timeout(5_000)).unwrap();
    let query = books_query();
    let started = Instant::now();

    let (holder, waiter) = tokio::join!(
        async {
            let value = request(&source, &query).await;
            (value, started.elapsed())
        },
        async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let value = request(&source, &query).await;
            (value, started.elapsed())
        }
    );

    assert_eq!(holder.0.unwrap(), "/books#1");
    assert_eq!(waiter.0.unwrap(), "/books#1");
    assert!(holder.1 >= Duration::from_millis(500), "holder took {:?}", holder.1);
    assert!(waiter.1 < Duration::from_millis(400), "waiter took {:?}", waiter.1);
    assert_eq!(source.producer().inner().retrievals(), 1);
    assert_eq!(buffer.writes(), 1);
}

#[tokio::test]
async fn test_shared_lock_name_never_mixes_up_values() {
    let source = CachingDataSource::new(
        CountingProducer::new("catalog").with_delay(Duration::from_millis(100)),
        Arc::new(CachePool::new()),
        Arc::new(SingleLock(LocalSharedData::new())),
        CacheConfig::default().with_coalescing_timeout(5_000),
    )
    .unwrap();
    let books = DataQuery::new("/books");
    let authors = DataQuery::new("/authors");

    let (first, second) = tokio::join!(request(&source, &books), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        request(&source, &authors).await
    });

    // The second caller waited on the shared lock, then missed its own key.
    assert_eq!(first.unwrap(), "/books#1");
    assert_eq!(second.unwrap(), "/authors#2");
    assert_eq!(source.producer().retrievals(), 2);

    assert_eq!(request(&source, &books).await.unwrap(), "/books#1");
    assert_eq!(request(&source, &authors).await.unwrap(), "/authors#2");
    assert_eq!(source.producer().retrievals(), 2);
}
