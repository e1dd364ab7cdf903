//! NeonBee Registry - Cluster-Wide Registries
//!
//! Layered registries over shared data:
//! - [`SharedDataRegistry`]: key to value-set store
//! - [`WriteSafeRegistry`]: per-key write lock plus a post-mutation hook
//! - [`SelfCleaningRegistry`]: node-owned entries with a merged read-only view
//!
//! and the coordination around them:
//! - [`RegistryController`]: registry bookkeeping and bulk cleanup per node
//! - [`ClusterLifecycle`] / [`membership_listener`]: cleanup on node departure and shutdown
//! - [`Reconciler`] / [`reconciliation_task`]: periodic repair against live membership

pub mod controller;
pub mod lifecycle;
pub mod reconcile;
pub mod registry;
pub mod self_cleaning;
pub mod write_safe;

pub use controller::{RegistryController, CONTROLLER_REGISTRY_NAME, REGISTRY_NAMES_KEY};
pub use lifecycle::{membership_listener, ClusterLifecycle};
pub use reconcile::{
    reconciliation_task, ReconcileReport, Reconciler, ReconciliationMetrics,
    ReconciliationSnapshot,
};
pub use registry::{Registry, SharedDataRegistry};
pub use self_cleaning::{
    node_key, split_node_key, SelfCleaningRegistry, NODE_SEPARATOR, READ_ONLY_SUFFIX,
};
pub use write_safe::{MutationHook, WriteSafeRegistry};
