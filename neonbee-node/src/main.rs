//! Standalone NeonBee node.
//!
//! Configured from `NEONBEE_*` environment variables; runs until Ctrl-C.

use neonbee_core::NodeConfig;
use neonbee_node::{init_tracing, Node, NodeError, NodeResult};

#[tokio::main]
async fn main() -> NodeResult<()> {
    let config = NodeConfig::from_env()?;
    init_tracing(config.log_format)?;

    let node = Node::standalone(config).await?;
    tracing::info!(node_id = %node.node_id(), "NeonBee node running");

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| NodeError::Signal(e.to_string()))?;
    tracing::info!("Shutdown signal received");

    let report = node.shutdown().await?;
    tracing::info!(
        node_id = %report.node_id,
        removed_entries = report.removed_entries,
        "Shutdown complete"
    );
    Ok(())
}
