//! Tracing subscriber setup for a node process.

use crate::error::{NodeError, NodeResult};
use neonbee_core::LogFormat;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_LOG_FILTER: &str =
    "neonbee_core=debug,neonbee_storage=debug,neonbee_registry=debug,neonbee_node=debug,info";

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides [`DEFAULT_LOG_FILTER`]. Fails if a global subscriber
/// is already installed.
pub fn init_tracing(format: LogFormat) -> NodeResult<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = match format {
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
        LogFormat::Pretty => registry.with(fmt::layer()).try_init(),
    };
    result.map_err(|e| NodeError::Telemetry(e.to_string()))?;

    tracing::info!(format = ?format, "Telemetry initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_initialization_fails() {
        // The first call may already fail if another test installed a subscriber.
        let _ = init_tracing(LogFormat::Pretty);
        let err = init_tracing(LogFormat::Json).unwrap_err();
        assert!(matches!(err, NodeError::Telemetry(_)));
    }

    #[test]
    fn test_default_filter_parses() {
        assert!(DEFAULT_LOG_FILTER.parse::<EnvFilter>().is_ok());
    }
}
