//! Registry cleanup hooked into cluster lifecycle events.

use crate::controller::RegistryController;
use neonbee_core::{ClusterMembership, MembershipEvent, NeonBeeResult, NodeId};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

/// Reacts to a node leaving the cluster and to the local node shutting down.
pub struct ClusterLifecycle {
    controller: Arc<RegistryController>,
    membership: Arc<dyn ClusterMembership>,
}

impl ClusterLifecycle {
    pub fn new(controller: Arc<RegistryController>, membership: Arc<dyn ClusterMembership>) -> Self {
        Self {
            controller,
            membership,
        }
    }

    pub fn controller(&self) -> &Arc<RegistryController> {
        &self.controller
    }

    /// Clean up after a departed node. Only the leader acts, so the cleanup
    /// runs once per departure. Returns whether this node acted.
    ///
    /// On failure the node's entries stay behind for reconciliation.
    pub async fn on_node_left(&self, node_id: &NodeId) -> NeonBeeResult<bool> {
        if !self.membership.is_leader().await {
            tracing::trace!(node_id = %node_id, "Not the cluster leader, leaving cleanup to it");
            return Ok(false);
        }
        let removed = self
            .controller
            .cleanup_all_registries_for_node(node_id)
            .await?;
        tracing::info!(node_id = %node_id, removed, "Cleaned up registries of departed node");
        Ok(true)
    }

    /// Remove the current node's own entries before it goes away.
    pub async fn on_shutdown(&self) -> NeonBeeResult<usize> {
        let node_id = self.membership.current_node_id();
        let removed = self
            .controller
            .cleanup_all_registries_for_node(&node_id)
            .await?;
        tracing::info!(node_id = %node_id, removed, "Cleaned up own registry entries on shutdown");
        Ok(removed)
    }
}

/// Background task forwarding `NodeLeft` events to [`ClusterLifecycle::on_node_left`].
///
/// `events` should be subscribed before the task is spawned so no departure
/// in between is missed. Runs until shutdown or until the event channel
/// closes.
pub async fn membership_listener(
    lifecycle: Arc<ClusterLifecycle>,
    mut events: broadcast::Receiver<MembershipEvent>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    tracing::info!("Membership listener started");

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::info!("Membership listener shutting down");
                    break;
                }
            }

            event = events.recv() => {
                match event {
                    Ok(MembershipEvent::NodeLeft(node_id)) => {
                        if let Err(e) = lifecycle.on_node_left(&node_id).await {
                            tracing::warn!(
                                node_id = %node_id,
                                error = %e,
                                "Cleanup of departed node failed, reconciliation will retry"
                            );
                        }
                    }
                    Ok(MembershipEvent::NodeJoined(node_id)) => {
                        tracing::debug!(node_id = %node_id, "Node joined the cluster");
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "Missed membership events, reconciliation will catch up");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("Membership event channel closed");
                        break;
                    }
                }
            }
        }
    }
}
