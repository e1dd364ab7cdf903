//! NeonBee Node
//!
//! Assembles one cluster node: the process-wide cache pool, the registry
//! controller, and the background tasks that keep registries consistent
//! with cluster membership.
//!
//! # Lifecycle
//!
//! - [`Node::start`] joins the cluster, rebuilds merged registry views and
//!   spawns the membership listener and (if enabled) the reconciliation task.
//! - [`Node::shutdown`] removes the node's own registry entries, stops the
//!   background tasks and leaves the cluster.

pub mod error;
pub mod telemetry;

pub use error::{NodeError, NodeResult};
pub use telemetry::{init_tracing, DEFAULT_LOG_FILTER};

use neonbee_core::{
    CacheConfig, ClusterMembership, LockProvider, NeonBeeResult, NodeConfig, NodeId, SharedData,
};
use neonbee_registry::{
    membership_listener, reconciliation_task, ClusterLifecycle, Reconciler,
    ReconciliationMetrics, ReconciliationSnapshot, RegistryController, SelfCleaningRegistry,
};
use neonbee_storage::{
    CachePool, CachedProducer, CachingDataSource, LocalCluster, LocalClusterNode, LocalSharedData,
};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// What a node did while shutting down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    pub node_id: NodeId,
    /// Registry keys of this node removed during shutdown.
    pub removed_entries: usize,
    /// Final reconciliation counters; `None` if reconciliation was disabled.
    pub reconciliation: Option<ReconciliationSnapshot>,
}

/// A running node.
pub struct Node {
    config: NodeConfig,
    membership: LocalClusterNode,
    shared_data: Arc<LocalSharedData>,
    cache_pool: Arc<CachePool>,
    controller: Arc<RegistryController>,
    lifecycle: Arc<ClusterLifecycle>,
    reconciler: Arc<Reconciler>,
    shutdown_tx: watch::Sender<bool>,
    listener: JoinHandle<()>,
    reconciliation: Option<JoinHandle<Arc<ReconciliationMetrics>>>,
}

impl Node {
    /// Join `cluster` over `shared_data` and spawn the background tasks.
    ///
    /// Must be called within a Tokio runtime.
    pub async fn start(
        config: NodeConfig,
        cluster: &LocalCluster,
        shared_data: Arc<LocalSharedData>,
    ) -> NodeResult<Self> {
        config.cache.validate()?;
        let node_id = config.node_id.clone().unwrap_or_else(NodeId::generate);

        let membership = cluster.join(node_id.clone());
        // Subscribe before anything else can announce a departure.
        let events = membership.subscribe();
        let members: Arc<dyn ClusterMembership> = Arc::new(membership.clone());

        let controller = Arc::new(RegistryController::new(
            node_id.clone(),
            Arc::clone(&shared_data) as Arc<dyn SharedData>,
            config.registry.clone(),
        ));
        controller.refresh_all().await?;

        let lifecycle = Arc::new(ClusterLifecycle::new(
            Arc::clone(&controller),
            Arc::clone(&members),
        ));
        let reconciler = Arc::new(Reconciler::new(Arc::clone(&controller), members));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let listener = tokio::spawn(membership_listener(
            Arc::clone(&lifecycle),
            events,
            shutdown_rx.clone(),
        ));
        let reconciliation = config.reconciliation.enabled.then(|| {
            tokio::spawn(reconciliation_task(
                Arc::clone(&reconciler),
                config.reconciliation.clone(),
                shutdown_rx,
            ))
        });

        tracing::info!(
            node_id = %node_id,
            members = cluster.members().len(),
            reconciliation = config.reconciliation.enabled,
            "Node started"
        );

        Ok(Self {
            config,
            membership,
            shared_data,
            cache_pool: Arc::new(CachePool::new()),
            controller,
            lifecycle,
            reconciler,
            shutdown_tx,
            listener,
            reconciliation,
        })
    }

    /// Start a node that is alone in its own cluster.
    pub async fn standalone(config: NodeConfig) -> NodeResult<Self> {
        Self::start(config, &LocalCluster::new(), Arc::new(LocalSharedData::new())).await
    }

    pub fn node_id(&self) -> NodeId {
        self.membership.current_node_id()
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub async fn is_leader(&self) -> bool {
        self.membership.is_leader().await
    }

    pub fn controller(&self) -> &Arc<RegistryController> {
        &self.controller
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    pub fn cache_pool(&self) -> &Arc<CachePool> {
        &self.cache_pool
    }

    pub fn shared_data(&self) -> &Arc<LocalSharedData> {
        &self.shared_data
    }

    /// Open a self-cleaning registry as this node.
    pub async fn open_registry(&self, name: &str) -> NeonBeeResult<SelfCleaningRegistry> {
        self.controller.open_registry(name).await
    }

    /// Wrap `producer` in a caching decorator using this node's cache pool,
    /// cluster locks and cache configuration.
    pub fn caching_source<P: CachedProducer>(
        &self,
        producer: P,
    ) -> NeonBeeResult<CachingDataSource<P>> {
        self.caching_source_with(producer, self.config.cache.clone())
    }

    /// Like [`Node::caching_source`] with an explicit cache configuration.
    pub fn caching_source_with<P: CachedProducer>(
        &self,
        producer: P,
        config: CacheConfig,
    ) -> NeonBeeResult<CachingDataSource<P>> {
        CachingDataSource::new(
            producer,
            Arc::clone(&self.cache_pool),
            Arc::clone(&self.shared_data) as Arc<dyn LockProvider>,
            config,
        )
    }

    /// Remove this node's registry entries, stop the background tasks and
    /// leave the cluster.
    ///
    /// The tasks are stopped and the cluster is left even when the cleanup
    /// fails; the cleanup error is returned afterwards.
    pub async fn shutdown(self) -> NodeResult<ShutdownReport> {
        let node_id = self.node_id();
        let cleanup = self.lifecycle.on_shutdown().await;
        if let Err(e) = &cleanup {
            tracing::warn!(
                node_id = %node_id,
                error = %e,
                "Own registry cleanup failed, leaving it to the cluster leader"
            );
        }

        let _ = self.shutdown_tx.send(true);
        self.listener.await.map_err(|e| NodeError::TaskFailed {
            task: "membership listener",
            reason: e.to_string(),
        })?;
        let reconciliation = match self.reconciliation {
            Some(handle) => Some(
                handle
                    .await
                    .map_err(|e| NodeError::TaskFailed {
                        task: "reconciliation",
                        reason: e.to_string(),
                    })?
                    .snapshot(),
            ),
            None => None,
        };

        self.membership.cluster().leave(&node_id);
        let removed_entries = cleanup?;
        tracing::info!(node_id = %node_id, removed_entries, "Node stopped");

        Ok(ShutdownReport {
            node_id,
            removed_entries,
            reconciliation,
        })
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("node_id", &self.node_id())
            .field("config", &self.config)
            .finish()
    }
}
