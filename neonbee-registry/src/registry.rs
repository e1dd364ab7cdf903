//! Key to value-set registry over a shared async map.
//!
//! # State per key
//!
//! ```text
//! absent ── register(v) ──→ present({v})
//! present(s) ── register / unregister ──→ present(s ∪ v / s − v)
//! present(s) ── unregister, s − v empty ──→ absent
//! ```

use async_trait::async_trait;
use neonbee_core::{
    difference_in_place, union_into, AsyncMap, NeonBeeResult, SharedData, ValueSet,
};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// A cluster-wide registry of value sets.
#[async_trait]
pub trait Registry: Send + Sync {
    fn name(&self) -> &str;

    /// Add values to the set under `key`, creating the key if absent.
    /// Values already present are not added twice.
    async fn register(&self, key: &str, values: &[Value]) -> NeonBeeResult<()>;

    /// Remove values from the set under `key`; an emptied key is removed.
    async fn unregister(&self, key: &str, values: &[Value]) -> NeonBeeResult<()>;

    /// Values under `key`, empty if the key is absent.
    async fn get(&self, key: &str) -> NeonBeeResult<ValueSet>;

    /// Any one value under `key`.
    async fn get_any(&self, key: &str) -> NeonBeeResult<Option<Value>> {
        Ok(self.get(key).await?.into_iter().next())
    }

    async fn get_keys(&self) -> NeonBeeResult<HashSet<String>>;
}

/// [`Registry`] stored in the shared async map of the same name.
///
/// Mutations are read-modify-write without a lock; concurrent writers to
/// one key must go through [`WriteSafeRegistry`](crate::WriteSafeRegistry).
#[derive(Clone)]
pub struct SharedDataRegistry {
    name: String,
    shared_data: Arc<dyn SharedData>,
}

impl SharedDataRegistry {
    pub fn new(name: impl Into<String>, shared_data: Arc<dyn SharedData>) -> Self {
        Self {
            name: name.into(),
            shared_data,
        }
    }

    pub fn shared_data(&self) -> &Arc<dyn SharedData> {
        &self.shared_data
    }

    async fn map(&self) -> NeonBeeResult<Arc<dyn AsyncMap>> {
        self.shared_data.async_map(&self.name).await
    }

    /// Snapshot of every key and its values.
    pub async fn entries(&self) -> NeonBeeResult<HashMap<String, ValueSet>> {
        self.map().await?.entries().await
    }

    /// Replace the values under `key`. An empty set removes the key.
    pub async fn put(&self, key: &str, values: ValueSet) -> NeonBeeResult<()> {
        let map = self.map().await?;
        if values.is_empty() {
            map.remove(key).await?;
            return Ok(());
        }
        map.put(key, values).await
    }

    pub async fn remove(&self, key: &str) -> NeonBeeResult<Option<ValueSet>> {
        self.map().await?.remove(key).await
    }

    pub async fn clear(&self) -> NeonBeeResult<()> {
        self.map().await?.clear().await
    }
}

#[async_trait]
impl Registry for SharedDataRegistry {
    fn name(&self) -> &str {
        &self.name
    }

    async fn register(&self, key: &str, values: &[Value]) -> NeonBeeResult<()> {
        let map = self.map().await?;
        let mut set = map.get(key).await?.unwrap_or_default();
        if union_into(&mut set, values.iter().cloned()) == 0 {
            return Ok(());
        }
        map.put(key, set).await
    }

    async fn unregister(&self, key: &str, values: &[Value]) -> NeonBeeResult<()> {
        let map = self.map().await?;
        let Some(mut set) = map.get(key).await? else {
            return Ok(());
        };
        if difference_in_place(&mut set, values) == 0 {
            return Ok(());
        }
        if set.is_empty() {
            map.remove(key).await?;
            return Ok(());
        }
        map.put(key, set).await
    }

    async fn get(&self, key: &str) -> NeonBeeResult<ValueSet> {
        Ok(self.map().await?.get(key).await?.unwrap_or_default())
    }

    async fn get_keys(&self) -> NeonBeeResult<HashSet<String>> {
        self.map().await?.keys().await
    }
}

impl std::fmt::Debug for SharedDataRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedDataRegistry")
            .field("name", &self.name)
            .finish()
    }
}
