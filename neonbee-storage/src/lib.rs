//! NeonBee Storage - Caching Core and Local Collaborators
//!
//! - Caching decorator with request coalescing and a per-type cache pool
//! - Buffering decorator for a durable second tier
//! - In-process shared data (async maps, named locks) and cluster membership

pub mod cache;
pub mod shared;

pub use cache::{
    BufferWriteMode, Buffered, CachePool, CacheStats, CachedProducer, CachingDataSource,
    DataBuffer, ProducerCache,
};
pub use shared::{LocalAsyncMap, LocalCluster, LocalClusterNode, LocalLockProvider, LocalSharedData};
