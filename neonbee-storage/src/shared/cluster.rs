//! In-process cluster membership.
//!
//! Members are kept in join order; the oldest remaining member is the leader.

use async_trait::async_trait;
use neonbee_core::{ClusterMembership, MembershipEvent, NeonBeeResult, NodeId};
use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug)]
struct ClusterState {
    members: RwLock<Vec<NodeId>>,
    events: broadcast::Sender<MembershipEvent>,
}

/// A cluster whose nodes all live in the current process.
#[derive(Debug, Clone)]
pub struct LocalCluster {
    state: Arc<ClusterState>,
}

impl Default for LocalCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalCluster {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: Arc::new(ClusterState {
                members: RwLock::new(Vec::new()),
                events,
            }),
        }
    }

    /// Add a node and return its membership view.
    ///
    /// Joining twice with the same id returns a second view of the same
    /// member without announcing it again.
    pub fn join(&self, node_id: impl Into<NodeId>) -> LocalClusterNode {
        let node_id = node_id.into();
        let newly_joined = {
            let mut members = self.state.members.write().unwrap_or_else(|e| e.into_inner());
            if members.contains(&node_id) {
                false
            } else {
                members.push(node_id.clone());
                true
            }
        };
        if newly_joined {
            let _ = self
                .state
                .events
                .send(MembershipEvent::NodeJoined(node_id.clone()));
        }
        LocalClusterNode {
            node_id,
            cluster: self.clone(),
        }
    }

    /// Remove a node and announce its departure. Returns false if unknown.
    pub fn leave(&self, node_id: &NodeId) -> bool {
        if !self.remove_member(node_id) {
            return false;
        }
        let _ = self
            .state
            .events
            .send(MembershipEvent::NodeLeft(node_id.clone()));
        true
    }

    /// Remove a node without announcing it, as when the departure
    /// notification is lost. Only reconciliation will notice.
    pub fn evict_silently(&self, node_id: &NodeId) -> bool {
        self.remove_member(node_id)
    }

    pub fn members(&self) -> Vec<NodeId> {
        self.state
            .members
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn leader(&self) -> Option<NodeId> {
        self.state
            .members
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .first()
            .cloned()
    }

    fn remove_member(&self, node_id: &NodeId) -> bool {
        let mut members = self.state.members.write().unwrap_or_else(|e| e.into_inner());
        let before = members.len();
        members.retain(|member| member != node_id);
        members.len() != before
    }
}

/// One node's view of a [`LocalCluster`].
#[derive(Debug, Clone)]
pub struct LocalClusterNode {
    node_id: NodeId,
    cluster: LocalCluster,
}

impl LocalClusterNode {
    pub fn cluster(&self) -> &LocalCluster {
        &self.cluster
    }
}

#[async_trait]
impl ClusterMembership for LocalClusterNode {
    fn current_node_id(&self) -> NodeId {
        self.node_id.clone()
    }

    async fn is_leader(&self) -> bool {
        self.cluster.leader().as_ref() == Some(&self.node_id)
    }

    async fn member_node_ids(&self) -> NeonBeeResult<HashSet<NodeId>> {
        Ok(self.cluster.members().into_iter().collect())
    }

    fn subscribe(&self) -> broadcast::Receiver<MembershipEvent> {
        self.cluster.state.events.subscribe()
    }
}
