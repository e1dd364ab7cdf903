//! Error types for NeonBee operations

use std::time::Duration;
use thiserror::Error;

/// Errors raised by shared-data collaborators (locks and async maps).
///
/// These are coordination failures: callers in the caching core convert them
/// into fallback behaviour instead of failing the request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SharedDataError {
    #[error("Timed out after {timeout:?} waiting for lock {name}")]
    LockTimeout { name: String, timeout: Duration },

    #[error("Async map {map} unavailable: {reason}")]
    MapUnavailable { map: String, reason: String },

    #[error("Serialization failed: {reason}")]
    Serialization { reason: String },
}

/// Registry and registry-controller errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("{kind} {id} is already registered")]
    AlreadyRegistered { kind: String, id: String },

    #[error("Cleanup for node {node_id} failed in registries {registries:?}")]
    CleanupFailed {
        node_id: String,
        registries: Vec<String>,
    },
}

/// Secondary-store (buffer) errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BufferError {
    #[error("No buffered value for key {key}")]
    NotFound { key: String },

    #[error("Buffer read failed: {reason}")]
    ReadFailed { reason: String },

    #[error("Buffer write failed: {reason}")]
    WriteFailed { reason: String },
}

/// Data production errors surfaced to the original caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DataError {
    #[error("Producer {producer} failed: {reason}")]
    ProductionFailed { producer: String, reason: String },

    #[error("Invalid query: {reason}")]
    InvalidQuery { reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all NeonBee errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NeonBeeError {
    #[error("Shared data error: {0}")]
    SharedData(#[from] SharedDataError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Buffer error: {0}")]
    Buffer(#[from] BufferError),

    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl NeonBeeError {
    /// Whether this is a buffer "not found", which callers treat as a plain miss.
    pub fn is_buffer_not_found(&self) -> bool {
        matches!(self, NeonBeeError::Buffer(BufferError::NotFound { .. }))
    }

    /// Whether this error only means a lock could not be had in time.
    pub fn is_coordination_failure(&self) -> bool {
        matches!(
            self,
            NeonBeeError::SharedData(SharedDataError::LockTimeout { .. })
        )
    }
}

/// Result type alias for NeonBee operations.
pub type NeonBeeResult<T> = Result<T, NeonBeeError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_timeout_display() {
        let err = SharedDataError::LockTimeout {
            name: "books-cache-00ff".to_string(),
            timeout: Duration::from_millis(250),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Timed out"));
        assert!(msg.contains("books-cache-00ff"));
        assert!(msg.contains("250ms"));
    }

    #[test]
    fn test_already_registered_display() {
        let err = RegistryError::AlreadyRegistered {
            kind: "Producer cache".to_string(),
            id: "books".to_string(),
        };
        assert_eq!(format!("{}", err), "Producer cache books is already registered");
    }

    #[test]
    fn test_cleanup_failed_lists_registries() {
        let err = RegistryError::CleanupFailed {
            node_id: "node-b".to_string(),
            registries: vec!["entities".to_string(), "health".to_string()],
        };
        let msg = format!("{}", err);
        assert!(msg.contains("node-b"));
        assert!(msg.contains("entities"));
        assert!(msg.contains("health"));
    }

    #[test]
    fn test_neonbee_error_from_variants() {
        let shared = NeonBeeError::from(SharedDataError::Serialization {
            reason: "bad".to_string(),
        });
        assert!(matches!(shared, NeonBeeError::SharedData(_)));

        let buffer = NeonBeeError::from(BufferError::NotFound {
            key: "k".to_string(),
        });
        assert!(buffer.is_buffer_not_found());

        let data = NeonBeeError::from(DataError::InvalidQuery {
            reason: "empty path".to_string(),
        });
        assert!(matches!(data, NeonBeeError::Data(_)));
        assert!(!data.is_buffer_not_found());

        let config = NeonBeeError::from(ConfigError::InvalidValue {
            field: "cache_lifetime".to_string(),
            value: "0".to_string(),
            reason: "must be positive".to_string(),
        });
        assert!(matches!(config, NeonBeeError::Config(_)));
    }

    #[test]
    fn test_coordination_failure_classification() {
        let timeout = NeonBeeError::from(SharedDataError::LockTimeout {
            name: "l".to_string(),
            timeout: Duration::from_millis(1),
        });
        assert!(timeout.is_coordination_failure());

        let map = NeonBeeError::from(SharedDataError::MapUnavailable {
            map: "m".to_string(),
            reason: "down".to_string(),
        });
        assert!(!map.is_coordination_failure());
    }
}
