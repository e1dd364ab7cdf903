//! Caching and buffering decorators for data producers.
//!
//! A [`CachingDataSource`] wraps a [`CachedProducer`] with an in-memory cache
//! shared by all instances of the producer type (owned by a [`CachePool`])
//! and coalesces concurrent misses for one key behind a named lock. Wrapping
//! the producer in [`Buffered`] first adds a durable second tier.
//!
//! # Example
//!
//! ```ignore
//! let pool = Arc::new(CachePool::new());
//! let producer = Buffered::new(BooksProducer::new(), Arc::new(BooksBuffer::new()));
//! let source = CachingDataSource::new(producer, pool, shared_data, CacheConfig::default())?;
//!
//! let context = DataContext::new();
//! let required = source.require_data(&query, &context).await?;
//! let results = resolve(required).await?;
//! let books = source.retrieve_data(&query, &results, &context).await?;
//! ```

pub mod buffering;
pub mod caching;
pub mod pool;
pub mod store;
pub mod traits;

pub use buffering::{BufferWriteMode, Buffered};
pub use caching::CachingDataSource;
pub use pool::CachePool;
pub use store::ProducerCache;
pub use traits::{CacheStats, CachedProducer, DataBuffer};
