//! Bookkeeping of all self-cleaning registries and bulk cleanup per node.

use crate::registry::Registry;
use crate::self_cleaning::SelfCleaningRegistry;
use crate::write_safe::WriteSafeRegistry;
use futures_util::future::join_all;
use neonbee_core::{NeonBeeResult, NodeId, RegistryConfig, RegistryError, SharedData};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Name of the controller's own registry.
pub const CONTROLLER_REGISTRY_NAME: &str = "neonbee-registry-controller";

/// Key under which registry names are recorded.
pub const REGISTRY_NAMES_KEY: &str = "registries";

/// Tracks which self-cleaning registries exist and cleans up after nodes.
///
/// The list of registry names is itself stored in a write-safe registry, so
/// every node of the cluster sees registries added by any other node.
pub struct RegistryController {
    node_id: NodeId,
    shared_data: Arc<dyn SharedData>,
    config: RegistryConfig,
    names: WriteSafeRegistry,
}

impl RegistryController {
    pub fn new(node_id: NodeId, shared_data: Arc<dyn SharedData>, config: RegistryConfig) -> Self {
        let names =
            WriteSafeRegistry::new(CONTROLLER_REGISTRY_NAME, Arc::clone(&shared_data), &config);
        Self {
            node_id,
            shared_data,
            config,
            names,
        }
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Record `name` so it is included in cleanup and refresh.
    pub async fn add_registry(&self, name: &str) -> NeonBeeResult<()> {
        self.names
            .register(REGISTRY_NAMES_KEY, &[Value::String(name.to_string())])
            .await
    }

    /// Record `name` and open it as the current node.
    pub async fn open_registry(&self, name: &str) -> NeonBeeResult<SelfCleaningRegistry> {
        let registry = self.registry(name)?;
        self.add_registry(name).await?;
        Ok(registry)
    }

    /// Known registry names, sorted.
    pub async fn registry_names(&self) -> NeonBeeResult<Vec<String>> {
        let mut names: Vec<String> = self
            .names
            .get(REGISTRY_NAMES_KEY)
            .await?
            .into_iter()
            .filter_map(|value| value.as_str().map(str::to_string))
            .collect();
        names.sort();
        Ok(names)
    }

    /// Node ids owning entries in any known registry.
    pub async fn referenced_node_ids(&self) -> NeonBeeResult<HashSet<NodeId>> {
        let mut node_ids = HashSet::new();
        for name in self.registry_names().await? {
            node_ids.extend(self.registry(&name)?.referenced_node_ids().await?);
        }
        Ok(node_ids)
    }

    /// Remove every entry of `node_id` from every known registry.
    ///
    /// Registries are cleaned independently; a failure in one does not stop
    /// the others. Fails with `RegistryError::CleanupFailed` naming the
    /// registries that could not be cleaned. Returns the number of keys
    /// removed otherwise.
    pub async fn cleanup_all_registries_for_node(&self, node_id: &NodeId) -> NeonBeeResult<usize> {
        let names = self.registry_names().await?;
        let results = join_all(names.iter().map(|name| async move {
            let outcome = match self.registry(name) {
                Ok(registry) => registry.unregister_node(node_id).await,
                Err(e) => Err(e),
            };
            (name.as_str(), outcome)
        }))
        .await;

        let mut removed = 0;
        let mut failed = Vec::new();
        for (name, outcome) in results {
            match outcome {
                Ok(count) => removed += count,
                Err(e) => {
                    tracing::warn!(
                        registry = %name,
                        node_id = %node_id,
                        error = %e,
                        "Registry cleanup failed"
                    );
                    failed.push(name.to_string());
                }
            }
        }

        if !failed.is_empty() {
            return Err(RegistryError::CleanupFailed {
                node_id: node_id.to_string(),
                registries: failed,
            }
            .into());
        }
        tracing::debug!(
            node_id = %node_id,
            registries = names.len(),
            removed,
            "Node cleaned up from all registries"
        );
        Ok(removed)
    }

    /// Rebuild the merged view of every known registry.
    ///
    /// All registries are attempted; the first failure is returned.
    pub async fn refresh_all(&self) -> NeonBeeResult<()> {
        let names = self.registry_names().await?;
        let results = join_all(names.iter().map(|name| async move {
            match self.registry(name) {
                Ok(registry) => registry.refresh().await,
                Err(e) => Err(e),
            }
        }))
        .await;

        let mut first_error = None;
        for (name, result) in names.iter().zip(results) {
            if let Err(e) = result {
                tracing::warn!(registry = %name, error = %e, "Registry refresh failed");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn registry(&self, name: &str) -> NeonBeeResult<SelfCleaningRegistry> {
        SelfCleaningRegistry::new(
            name,
            self.node_id.clone(),
            Arc::clone(&self.shared_data),
            &self.config,
        )
    }
}

impl fmt::Debug for RegistryController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryController")
            .field("node_id", &self.node_id)
            .field("config", &self.config)
            .finish()
    }
}
