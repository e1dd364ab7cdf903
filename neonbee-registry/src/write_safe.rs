//! Registry whose mutations are serialized per key by a named lock.

use crate::registry::{Registry, SharedDataRegistry};
use async_trait::async_trait;
use neonbee_core::{Acquired, Lock, NeonBeeResult, RegistryConfig, SharedData, ValueSet};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Action run after a mutation, while the key's lock is still held.
#[async_trait]
pub trait MutationHook: Send + Sync {
    async fn after_mutation(&self, registry: &str, key: &str) -> NeonBeeResult<()>;
}

/// [`Registry`] that takes the lock `"{registry}-{key}"` around every
/// register and unregister.
///
/// A lock that cannot be acquired within the configured timeout fails the
/// mutation; nothing is written in that case.
///
/// A failing [`MutationHook`] also fails the mutation, but the write itself
/// has already been stored. Register and unregister are set operations, so
/// retrying them is harmless and reruns the hook.
#[derive(Clone)]
pub struct WriteSafeRegistry {
    inner: SharedDataRegistry,
    lock_timeout: std::time::Duration,
    hook: Option<Arc<dyn MutationHook>>,
}

impl WriteSafeRegistry {
    pub fn new(
        name: impl Into<String>,
        shared_data: Arc<dyn SharedData>,
        config: &RegistryConfig,
    ) -> Self {
        Self {
            inner: SharedDataRegistry::new(name, shared_data),
            lock_timeout: config.lock_timeout,
            hook: None,
        }
    }

    pub fn with_hook(mut self, hook: Arc<dyn MutationHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Unlocked access to the underlying map.
    pub fn inner(&self) -> &SharedDataRegistry {
        &self.inner
    }

    /// Name of the write lock of `key`.
    pub fn lock_name(&self, key: &str) -> String {
        format!("{}-{}", self.inner.name(), key)
    }

    async fn lock(&self, key: &str) -> NeonBeeResult<Lock<Acquired>> {
        self.inner
            .shared_data()
            .acquire_lock(&self.lock_name(key), self.lock_timeout)
            .await
    }

    async fn after_mutation(&self, key: &str) -> NeonBeeResult<()> {
        match &self.hook {
            Some(hook) => hook.after_mutation(self.inner.name(), key).await,
            None => Ok(()),
        }
    }

    /// Remove `key` entirely under its write lock.
    pub async fn remove(&self, key: &str) -> NeonBeeResult<Option<ValueSet>> {
        let lock = self.lock(key).await?;
        let removed = self.inner.remove(key).await?;
        self.after_mutation(key).await?;
        lock.release();
        Ok(removed)
    }
}

#[async_trait]
impl Registry for WriteSafeRegistry {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn register(&self, key: &str, values: &[Value]) -> NeonBeeResult<()> {
        let lock = self.lock(key).await?;
        self.inner.register(key, values).await?;
        self.after_mutation(key).await?;
        lock.release();
        Ok(())
    }

    async fn unregister(&self, key: &str, values: &[Value]) -> NeonBeeResult<()> {
        let lock = self.lock(key).await?;
        self.inner.unregister(key, values).await?;
        self.after_mutation(key).await?;
        lock.release();
        Ok(())
    }

    async fn get(&self, key: &str) -> NeonBeeResult<ValueSet> {
        self.inner.get(key).await
    }

    async fn get_keys(&self) -> NeonBeeResult<HashSet<String>> {
        self.inner.get_keys().await
    }
}

impl fmt::Debug for WriteSafeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteSafeRegistry")
            .field("name", &self.inner.name())
            .field("lock_timeout", &self.lock_timeout)
            .field("hook", &self.hook.is_some())
            .finish()
    }
}
