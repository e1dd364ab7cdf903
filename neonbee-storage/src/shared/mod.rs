//! Single-process shared data and cluster membership.
//!
//! Every node of an in-process cluster shares one [`LocalSharedData`], which
//! makes its maps and locks "cluster-wide" for that cluster.

mod cluster;
mod lock;
mod map;

pub use cluster::{LocalCluster, LocalClusterNode};
pub use lock::LocalLockProvider;
pub use map::LocalAsyncMap;

use async_trait::async_trait;
use neonbee_core::{Acquired, AsyncMap, Lock, LockProvider, NeonBeeResult, SharedData};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Named async maps and named locks held in process memory.
#[derive(Debug, Default)]
pub struct LocalSharedData {
    maps: RwLock<HashMap<String, Arc<LocalAsyncMap>>>,
    locks: LocalLockProvider,
}

impl LocalSharedData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the maps created so far, sorted.
    pub fn map_names(&self) -> Vec<String> {
        let maps = self.maps.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = maps.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of lock names currently held or waited on.
    pub fn active_locks(&self) -> usize {
        self.locks.active_locks()
    }

    fn local_map(&self, name: &str) -> Arc<LocalAsyncMap> {
        if let Some(map) = self
            .maps
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
        {
            return Arc::clone(map);
        }

        let mut maps = self.maps.write().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            maps.entry(name.to_string())
                .or_insert_with(|| Arc::new(LocalAsyncMap::new(name))),
        )
    }
}

#[async_trait]
impl LockProvider for LocalSharedData {
    async fn acquire_lock(&self, name: &str, timeout: Duration) -> NeonBeeResult<Lock<Acquired>> {
        self.locks.acquire_lock(name, timeout).await
    }
}

#[async_trait]
impl SharedData for LocalSharedData {
    async fn async_map(&self, name: &str) -> NeonBeeResult<Arc<dyn AsyncMap>> {
        let map: Arc<dyn AsyncMap> = self.local_map(name);
        Ok(map)
    }
}
