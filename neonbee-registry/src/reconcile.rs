//! Reconciliation of registry state against live cluster membership.
//!
//! A node id is stale when some registry still holds entries for it but the
//! cluster no longer lists it as a member. Stale ids whose cleanup fails stay
//! pending and are retried on the next pass.
//!
//! # Configuration
//!
//! The background task is configured via `ReconciliationConfig`:
//!
//! ```rust
//! use neonbee_core::ReconciliationConfig;
//! use std::time::Duration;
//!
//! let config = ReconciliationConfig {
//!     interval: Duration::from_secs(60), // Reconcile every minute
//!     enabled: true,
//! };
//! ```

use crate::controller::RegistryController;
use neonbee_core::{ClusterMembership, NeonBeeResult, NodeId, ReconciliationConfig};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

// ============================================================================
// RECONCILER
// ============================================================================

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Ids referenced by registries (or pending) but not cluster members.
    pub stale: BTreeSet<NodeId>,
    /// Stale ids whose entries were removed from every registry.
    pub cleaned: BTreeSet<NodeId>,
    /// Stale ids whose cleanup failed; retried next pass.
    pub pending: BTreeSet<NodeId>,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        self.stale.is_empty()
    }
}

/// Compares registry contents with cluster membership and removes the
/// entries of departed nodes.
pub struct Reconciler {
    controller: Arc<RegistryController>,
    membership: Arc<dyn ClusterMembership>,
    pending: Mutex<BTreeSet<NodeId>>,
}

impl Reconciler {
    pub fn new(controller: Arc<RegistryController>, membership: Arc<dyn ClusterMembership>) -> Self {
        Self {
            controller,
            membership,
            pending: Mutex::new(BTreeSet::new()),
        }
    }

    /// Node ids whose cleanup failed on the last pass.
    pub fn pending(&self) -> BTreeSet<NodeId> {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Run one pass.
    ///
    /// Fails only if registry contents or membership cannot be read; cleanup
    /// failures are reported as pending.
    pub async fn reconcile(&self) -> NeonBeeResult<ReconcileReport> {
        let members = self.membership.member_node_ids().await?;
        let referenced = self.controller.referenced_node_ids().await?;

        let mut stale: BTreeSet<NodeId> = referenced
            .into_iter()
            .filter(|id| !members.contains(id))
            .collect();
        stale.extend(
            self.pending()
                .into_iter()
                .filter(|id| !members.contains(id)),
        );

        let mut report = ReconcileReport {
            stale: stale.clone(),
            ..Default::default()
        };
        for node_id in stale {
            match self.controller.cleanup_all_registries_for_node(&node_id).await {
                Ok(_) => {
                    report.cleaned.insert(node_id);
                }
                Err(e) => {
                    tracing::warn!(
                        node_id = %node_id,
                        error = %e,
                        "Stale node cleanup failed, keeping it pending"
                    );
                    report.pending.insert(node_id);
                }
            }
        }

        *self.pending.lock().unwrap_or_else(|e| e.into_inner()) = report.pending.clone();
        Ok(report)
    }
}

// ============================================================================
// METRICS
// ============================================================================

/// Counters of the reconciliation task.
#[derive(Debug, Default)]
pub struct ReconciliationMetrics {
    /// Passes run (leader only)
    pub cycles: AtomicU64,

    /// Ticks skipped because this node was not the leader
    pub skipped_not_leader: AtomicU64,

    /// Stale node ids cleaned up
    pub nodes_cleaned: AtomicU64,

    /// Passes that failed or left nodes pending
    pub errors: AtomicU64,
}

impl ReconciliationMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current snapshot of all metrics.
    pub fn snapshot(&self) -> ReconciliationSnapshot {
        ReconciliationSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            skipped_not_leader: self.skipped_not_leader.load(Ordering::Relaxed),
            nodes_cleaned: self.nodes_cleaned.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of reconciliation metrics at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationSnapshot {
    pub cycles: u64,
    pub skipped_not_leader: u64,
    pub nodes_cleaned: u64,
    pub errors: u64,
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Background task that periodically reconciles registries with membership.
///
/// Only the cluster leader reconciles; other nodes skip the tick. Runs until
/// the shutdown signal is received and returns the collected metrics.
///
/// # Example
///
/// ```ignore
/// let (shutdown_tx, shutdown_rx) = watch::channel(false);
/// let handle = tokio::spawn(reconciliation_task(reconciler, config, shutdown_rx));
///
/// // On shutdown
/// let _ = shutdown_tx.send(true);
/// let metrics = handle.await?;
/// ```
pub async fn reconciliation_task(
    reconciler: Arc<Reconciler>,
    config: ReconciliationConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<ReconciliationMetrics> {
    let metrics = Arc::new(ReconciliationMetrics::new());

    let mut ticker = interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        interval_ms = config.interval.as_millis() as u64,
        "Registry reconciliation task started"
    );

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::info!("Registry reconciliation task shutting down");
                    break;
                }
            }

            _ = ticker.tick() => {
                reconcile_cycle(&reconciler, &metrics).await;
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        cycles = snapshot.cycles,
        skipped_not_leader = snapshot.skipped_not_leader,
        nodes_cleaned = snapshot.nodes_cleaned,
        errors = snapshot.errors,
        "Registry reconciliation task completed"
    );

    metrics
}

async fn reconcile_cycle(reconciler: &Reconciler, metrics: &ReconciliationMetrics) {
    if !reconciler.membership.is_leader().await {
        metrics.skipped_not_leader.fetch_add(1, Ordering::Relaxed);
        tracing::trace!("Not the cluster leader, skipping reconciliation");
        return;
    }
    metrics.cycles.fetch_add(1, Ordering::Relaxed);

    match reconciler.reconcile().await {
        Ok(report) if report.is_noop() => {
            tracing::trace!("Reconciliation found no stale nodes");
        }
        Ok(report) => {
            metrics
                .nodes_cleaned
                .fetch_add(report.cleaned.len() as u64, Ordering::Relaxed);
            if !report.pending.is_empty() {
                metrics.errors.fetch_add(1, Ordering::Relaxed);
            }
            tracing::info!(
                stale = report.stale.len(),
                cleaned = report.cleaned.len(),
                pending = report.pending.len(),
                "Reconciliation cycle completed"
            );
        }
        Err(e) => {
            metrics.errors.fetch_add(1, Ordering::Relaxed);
            tracing::error!(error = %e, "Reconciliation cycle failed");
        }
    }
}
