//! Errors of node startup and shutdown.

use neonbee_core::NeonBeeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    NeonBee(#[from] NeonBeeError),

    #[error("Telemetry initialization failed: {0}")]
    Telemetry(String),

    #[error("Background task {task} failed: {reason}")]
    TaskFailed { task: &'static str, reason: String },

    #[error("Waiting for shutdown signal failed: {0}")]
    Signal(String),
}

pub type NodeResult<T> = Result<T, NodeError>;
