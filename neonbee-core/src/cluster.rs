//! Cluster membership contract.

use crate::{NeonBeeResult, NodeId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tokio::sync::broadcast;

/// Membership change observed by a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "event", content = "node_id", rename_all = "snake_case")]
pub enum MembershipEvent {
    NodeJoined(NodeId),
    NodeLeft(NodeId),
}

impl MembershipEvent {
    pub fn node_id(&self) -> &NodeId {
        match self {
            MembershipEvent::NodeJoined(id) | MembershipEvent::NodeLeft(id) => id,
        }
    }
}

/// View of the cluster from the perspective of the current node.
#[async_trait]
pub trait ClusterMembership: Send + Sync {
    /// Id of the node this view belongs to.
    fn current_node_id(&self) -> NodeId;

    /// Whether the current node is the cluster leader.
    ///
    /// Only the leader reacts to `NodeLeft`, so departed nodes are cleaned up
    /// once instead of by every remaining member.
    async fn is_leader(&self) -> bool;

    async fn member_node_ids(&self) -> NeonBeeResult<HashSet<NodeId>>;

    /// Subscribe to membership changes.
    fn subscribe(&self) -> broadcast::Receiver<MembershipEvent>;
}
