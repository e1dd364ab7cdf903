//! Node-scoped registry with a merged, read-only view.
//!
//! Writes land under `key#node-id` in the registry's own map, so every node
//! owns its contributions. Reads go to a second map, `{name}-read-only`,
//! that holds the union of all nodes' values per unsuffixed key. After every
//! write the merged view is rebuilt from scratch under its own lock.
//!
//! A crashed node's suffixed entries stay until [`SelfCleaningRegistry::unregister_node`]
//! runs for it, either from the cluster leader or from reconciliation.

use crate::registry::{Registry, SharedDataRegistry};
use crate::write_safe::{MutationHook, WriteSafeRegistry};
use async_trait::async_trait;
use neonbee_core::{
    union_into, ConfigError, NeonBeeResult, NodeId, RegistryConfig, SharedData, ValueSet,
};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Separator between a caller's key and the node id.
pub const NODE_SEPARATOR: char = '#';

/// Suffix of the read-only registry holding the merged view.
pub const READ_ONLY_SUFFIX: &str = "-read-only";

/// Key of the merged view's refresh lock within the read-only registry.
const MERGED_VIEW_LOCK_KEY: &str = "merged-view";

/// Append the node suffix to `key`.
pub fn node_key(key: &str, node_id: &NodeId) -> String {
    format!("{key}{NODE_SEPARATOR}{node_id}")
}

/// Split a suffixed key into the caller's key and the node id.
///
/// Node ids never contain the separator, so the last separator wins.
pub fn split_node_key(key: &str) -> Option<(&str, &str)> {
    key.rsplit_once(NODE_SEPARATOR)
        .filter(|(_, node_id)| !node_id.is_empty())
}

// ============================================================================
// MERGED VIEW
// ============================================================================

/// The accumulated, node-merged projection of one self-cleaning registry.
struct MergedView {
    source: SharedDataRegistry,
    read_only: SharedDataRegistry,
    lock_timeout: Duration,
}

impl MergedView {
    fn lock_name(&self) -> String {
        format!("{}-{}", self.read_only.name(), MERGED_VIEW_LOCK_KEY)
    }

    async fn refresh(&self) -> NeonBeeResult<()> {
        let lock = self
            .read_only
            .shared_data()
            .acquire_lock(&self.lock_name(), self.lock_timeout)
            .await?;

        let entries: BTreeMap<String, ValueSet> =
            self.source.entries().await?.into_iter().collect();
        let mut merged: BTreeMap<String, ValueSet> = BTreeMap::new();
        for (key, values) in entries {
            let Some((stripped, _)) = split_node_key(&key) else {
                continue;
            };
            union_into(merged.entry(stripped.to_string()).or_default(), values);
        }

        self.read_only.clear().await?;
        for (key, values) in merged {
            self.read_only.put(&key, values).await?;
        }

        lock.release();
        Ok(())
    }
}

#[async_trait]
impl MutationHook for MergedView {
    async fn after_mutation(&self, _registry: &str, _key: &str) -> NeonBeeResult<()> {
        self.refresh().await
    }
}

// ============================================================================
// SELF-CLEANING REGISTRY
// ============================================================================

/// Registry whose entries are owned by the node that wrote them.
#[derive(Clone)]
pub struct SelfCleaningRegistry {
    node_id: NodeId,
    writes: WriteSafeRegistry,
    merged: Arc<MergedView>,
}

impl SelfCleaningRegistry {
    /// Open the registry `name` as seen from `node_id`.
    ///
    /// Fails if the node id contains [`NODE_SEPARATOR`].
    pub fn new(
        name: impl Into<String>,
        node_id: NodeId,
        shared_data: Arc<dyn SharedData>,
        config: &RegistryConfig,
    ) -> NeonBeeResult<Self> {
        if node_id.as_str().is_empty() || node_id.as_str().contains(NODE_SEPARATOR) {
            return Err(ConfigError::InvalidValue {
                field: "node_id".to_string(),
                value: node_id.to_string(),
                reason: format!("must be non-empty and must not contain '{NODE_SEPARATOR}'"),
            }
            .into());
        }

        let name = name.into();
        let merged = Arc::new(MergedView {
            source: SharedDataRegistry::new(name.clone(), Arc::clone(&shared_data)),
            read_only: SharedDataRegistry::new(
                format!("{name}{READ_ONLY_SUFFIX}"),
                Arc::clone(&shared_data),
            ),
            lock_timeout: config.lock_timeout,
        });
        let writes = WriteSafeRegistry::new(name, shared_data, config)
            .with_hook(Arc::clone(&merged) as Arc<dyn MutationHook>);

        Ok(Self {
            node_id,
            writes,
            merged,
        })
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Name of the registry holding the merged view.
    pub fn read_only_name(&self) -> &str {
        self.merged.read_only.name()
    }

    /// Rebuild the merged view from all nodes' entries.
    pub async fn refresh(&self) -> NeonBeeResult<()> {
        self.merged.refresh().await
    }

    /// Suffixed keys and values exactly as stored, across all nodes.
    pub async fn node_entries(&self) -> NeonBeeResult<BTreeMap<String, ValueSet>> {
        Ok(self.writes.inner().entries().await?.into_iter().collect())
    }

    /// Node ids that own at least one entry.
    pub async fn referenced_node_ids(&self) -> NeonBeeResult<HashSet<NodeId>> {
        Ok(self
            .writes
            .get_keys()
            .await?
            .iter()
            .filter_map(|key| split_node_key(key))
            .map(|(_, node_id)| NodeId::from(node_id))
            .collect())
    }

    /// Remove every entry owned by `node_id`, then refresh the merged view.
    ///
    /// Returns the number of keys removed.
    pub async fn unregister_node(&self, node_id: &NodeId) -> NeonBeeResult<usize> {
        let owned: Vec<String> = self
            .writes
            .get_keys()
            .await?
            .into_iter()
            .filter(|key| {
                split_node_key(key).is_some_and(|(_, owner)| owner == node_id.as_str())
            })
            .collect();

        for key in &owned {
            self.writes.remove(key).await?;
        }
        self.refresh().await?;

        tracing::debug!(
            registry = %self.name(),
            node_id = %node_id,
            removed = owned.len(),
            "Node entries removed from registry"
        );
        Ok(owned.len())
    }
}

#[async_trait]
impl Registry for SelfCleaningRegistry {
    fn name(&self) -> &str {
        self.writes.name()
    }

    async fn register(&self, key: &str, values: &[Value]) -> NeonBeeResult<()> {
        self.writes
            .register(&node_key(key, &self.node_id), values)
            .await
    }

    async fn unregister(&self, key: &str, values: &[Value]) -> NeonBeeResult<()> {
        self.writes
            .unregister(&node_key(key, &self.node_id), values)
            .await
    }

    async fn get(&self, key: &str) -> NeonBeeResult<ValueSet> {
        self.merged.read_only.get(key).await
    }

    async fn get_keys(&self) -> NeonBeeResult<HashSet<String>> {
        self.merged.read_only.get_keys().await
    }
}

impl fmt::Debug for SelfCleaningRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelfCleaningRegistry")
            .field("name", &self.name())
            .field("node_id", &self.node_id)
            .finish()
    }
}
