//! NeonBee Core - Types and Collaborator Contracts
//!
//! Pure data structures and the traits the caching and registry layers are
//! written against. No implementation of any collaborator lives here:
//! - Error taxonomy and configuration
//! - Node identity and cluster membership contract
//! - Lock typestate and lock provider contract
//! - Shared async map contract
//! - Request data model, cache keys and the volatile cache register

pub mod cache_key;
pub mod cluster;
pub mod config;
pub mod data;
pub mod error;
pub mod identity;
pub mod lock;
pub mod shared_data;

pub use cache_key::{user_identifier, CacheKey, USER_IDENTIFIER_ATTRIBUTES};
pub use cluster::{ClusterMembership, MembershipEvent};
pub use config::{
    CacheConfig, LifetimeUnit, LogFormat, NodeConfig, ReconciliationConfig, RegistryConfig,
    DEFAULT_CACHE_LIFETIME_SECS, DEFAULT_CACHE_MAX_CAPACITY, DEFAULT_COALESCING_TIMEOUT_MS,
    DEFAULT_RECONCILIATION_INTERVAL_SECS, DEFAULT_REGISTRY_LOCK_TIMEOUT_SECS,
};
pub use data::{
    DataAction, DataContext, DataMap, DataQuery, DataRequest, VolatileCacheRegister,
};
pub use error::{
    BufferError, ConfigError, DataError, NeonBeeError, NeonBeeResult, RegistryError,
    SharedDataError,
};
pub use identity::{new_correlation_id, DurationMs, NodeId, Timestamp};
pub use lock::{Acquired, Lock, LockData, LockProvider, LockState, Released};
pub use shared_data::{difference_in_place, union_into, AsyncMap, SharedData, ValueSet};
