//! Configuration types

use crate::{ConfigError, DurationMs, NeonBeeError, NeonBeeResult, NodeId};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Default in-memory cache lifetime (5 minutes).
pub const DEFAULT_CACHE_LIFETIME_SECS: u64 = 300;

/// Default coalescing lock wait in milliseconds.
pub const DEFAULT_COALESCING_TIMEOUT_MS: DurationMs = 10_000;

/// Default maximum number of entries per producer cache.
pub const DEFAULT_CACHE_MAX_CAPACITY: u64 = 10_000;

/// Default wait for registry write locks.
pub const DEFAULT_REGISTRY_LOCK_TIMEOUT_SECS: u64 = 10;

/// Default interval between reconciliation passes.
pub const DEFAULT_RECONCILIATION_INTERVAL_SECS: u64 = 60;

// ============================================================================
// LIFETIME UNIT
// ============================================================================

/// Unit a configured cache lifetime amount is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifetimeUnit {
    Millis,
    Seconds,
    Minutes,
    Hours,
}

impl LifetimeUnit {
    pub fn to_duration(self, amount: u64) -> Duration {
        match self {
            LifetimeUnit::Millis => Duration::from_millis(amount),
            LifetimeUnit::Seconds => Duration::from_secs(amount),
            LifetimeUnit::Minutes => Duration::from_secs(amount.saturating_mul(60)),
            LifetimeUnit::Hours => Duration::from_secs(amount.saturating_mul(3600)),
        }
    }
}

impl FromStr for LifetimeUnit {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ms" | "millis" | "milliseconds" => Ok(LifetimeUnit::Millis),
            "s" | "secs" | "seconds" => Ok(LifetimeUnit::Seconds),
            "m" | "mins" | "minutes" => Ok(LifetimeUnit::Minutes),
            "h" | "hours" => Ok(LifetimeUnit::Hours),
            _ => Err(ConfigError::InvalidValue {
                field: "cache_lifetime_unit".to_string(),
                value: s.to_string(),
                reason: "expected one of millis, seconds, minutes, hours".to_string(),
            }),
        }
    }
}

// ============================================================================
// CACHE CONFIG
// ============================================================================

/// Configuration for a cached producer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Time-to-live of in-memory entries, measured from insertion.
    pub cache_lifetime: Duration,
    /// Maximum wait for the coalescing lock. Zero or negative disables coalescing.
    pub coalescing_timeout_ms: DurationMs,
    /// Maximum number of entries kept in memory.
    pub max_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_lifetime: Duration::from_secs(DEFAULT_CACHE_LIFETIME_SECS),
            coalescing_timeout_ms: DEFAULT_COALESCING_TIMEOUT_MS,
            max_capacity: DEFAULT_CACHE_MAX_CAPACITY,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.cache_lifetime = lifetime;
        self
    }

    pub fn with_lifetime_in(self, amount: u64, unit: LifetimeUnit) -> Self {
        self.with_lifetime(unit.to_duration(amount))
    }

    pub fn with_coalescing_timeout(mut self, timeout_ms: DurationMs) -> Self {
        self.coalescing_timeout_ms = timeout_ms;
        self
    }

    pub fn without_coalescing(self) -> Self {
        self.with_coalescing_timeout(0)
    }

    pub fn with_max_capacity(mut self, max: u64) -> Self {
        self.max_capacity = max;
        self
    }

    pub fn coalescing_enabled(&self) -> bool {
        self.coalescing_timeout_ms > 0
    }

    /// Lock wait for coalescing, or `None` when coalescing is disabled.
    pub fn coalescing_timeout(&self) -> Option<Duration> {
        u64::try_from(self.coalescing_timeout_ms)
            .ok()
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - cache_lifetime is positive
    /// - max_capacity is positive
    pub fn validate(&self) -> NeonBeeResult<()> {
        if self.cache_lifetime.is_zero() {
            return Err(NeonBeeError::Config(ConfigError::InvalidValue {
                field: "cache_lifetime".to_string(),
                value: format!("{:?}", self.cache_lifetime),
                reason: "cache_lifetime must be positive".to_string(),
            }));
        }

        if self.max_capacity == 0 {
            return Err(NeonBeeError::Config(ConfigError::InvalidValue {
                field: "max_capacity".to_string(),
                value: self.max_capacity.to_string(),
                reason: "max_capacity must be greater than 0".to_string(),
            }));
        }

        Ok(())
    }

    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `NEONBEE_CACHE_LIFETIME`: lifetime amount (default: 300)
    /// - `NEONBEE_CACHE_LIFETIME_UNIT`: unit of the amount (default: seconds)
    /// - `NEONBEE_CACHE_COALESCING_TIMEOUT_MS`: coalescing wait, <= 0 disables (default: 10000)
    /// - `NEONBEE_CACHE_MAX_CAPACITY`: entries per producer cache (default: 10000)
    pub fn from_env() -> NeonBeeResult<Self> {
        let defaults = Self::default();

        let unit = match std::env::var("NEONBEE_CACHE_LIFETIME_UNIT") {
            Ok(raw) => raw.parse::<LifetimeUnit>()?,
            Err(_) => LifetimeUnit::Seconds,
        };
        let cache_lifetime = env_parse::<u64>("NEONBEE_CACHE_LIFETIME")?
            .map(|amount| unit.to_duration(amount))
            .unwrap_or(defaults.cache_lifetime);

        let config = Self {
            cache_lifetime,
            coalescing_timeout_ms: env_parse("NEONBEE_CACHE_COALESCING_TIMEOUT_MS")?
                .unwrap_or(defaults.coalescing_timeout_ms),
            max_capacity: env_parse("NEONBEE_CACHE_MAX_CAPACITY")?
                .unwrap_or(defaults.max_capacity),
        };
        config.validate()?;
        Ok(config)
    }
}

// ============================================================================
// REGISTRY / RECONCILIATION CONFIG
// ============================================================================

/// Configuration shared by the registry stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Maximum wait for a per-key write lock.
    pub lock_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(DEFAULT_REGISTRY_LOCK_TIMEOUT_SECS),
        }
    }
}

impl RegistryConfig {
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }
}

/// Configuration of the periodic reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationConfig {
    pub interval: Duration,
    pub enabled: bool,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_RECONCILIATION_INTERVAL_SECS),
            enabled: true,
        }
    }
}

// ============================================================================
// NODE CONFIG
// ============================================================================

/// Log output format of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Master configuration of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct NodeConfig {
    /// Fixed node id; a fresh one is generated when absent.
    pub node_id: Option<NodeId>,
    pub cache: CacheConfig,
    pub registry: RegistryConfig,
    pub reconciliation: ReconciliationConfig,
    pub log_format: LogFormat,
}

impl NodeConfig {
    /// Create NodeConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `NEONBEE_NODE_ID`: node id (default: generated)
    /// - `NEONBEE_REGISTRY_LOCK_TIMEOUT_MS`: registry write lock wait (default: 10000)
    /// - `NEONBEE_RECONCILIATION_INTERVAL_SECS`: reconciliation interval (default: 60)
    /// - `NEONBEE_RECONCILIATION_ENABLED`: whether reconciliation runs (default: true)
    /// - `NEONBEE_LOG_FORMAT`: `pretty` or `json` (default: pretty)
    /// - cache variables, see [`CacheConfig::from_env`]
    pub fn from_env() -> NeonBeeResult<Self> {
        let registry_defaults = RegistryConfig::default();
        let reconciliation_defaults = ReconciliationConfig::default();

        let log_format = match std::env::var("NEONBEE_LOG_FORMAT") {
            Ok(raw) if raw.eq_ignore_ascii_case("json") => LogFormat::Json,
            Ok(raw) if raw.eq_ignore_ascii_case("pretty") => LogFormat::Pretty,
            Ok(raw) => {
                return Err(ConfigError::InvalidValue {
                    field: "log_format".to_string(),
                    value: raw,
                    reason: "expected pretty or json".to_string(),
                }
                .into())
            }
            Err(_) => LogFormat::default(),
        };

        Ok(Self {
            node_id: std::env::var("NEONBEE_NODE_ID")
                .ok()
                .filter(|s| !s.is_empty())
                .map(NodeId::from),
            cache: CacheConfig::from_env()?,
            registry: RegistryConfig {
                lock_timeout: env_parse::<u64>("NEONBEE_REGISTRY_LOCK_TIMEOUT_MS")?
                    .map(Duration::from_millis)
                    .unwrap_or(registry_defaults.lock_timeout),
            },
            reconciliation: ReconciliationConfig {
                interval: env_parse::<u64>("NEONBEE_RECONCILIATION_INTERVAL_SECS")?
                    .map(Duration::from_secs)
                    .unwrap_or(reconciliation_defaults.interval),
                enabled: std::env::var("NEONBEE_RECONCILIATION_ENABLED")
                    .map(|s| s == "true" || s == "1")
                    .unwrap_or(reconciliation_defaults.enabled),
            },
            log_format,
        })
    }
}

/// Parse an optional environment variable, rejecting malformed values.
fn env_parse<T: FromStr>(name: &str) -> NeonBeeResult<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            ConfigError::InvalidValue {
                field: name.to_string(),
                value: raw,
                reason: "could not be parsed".to_string(),
            }
            .into()
        }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_config_builder() {
        let config = CacheConfig::new()
            .with_lifetime_in(2, LifetimeUnit::Minutes)
            .with_coalescing_timeout(250)
            .with_max_capacity(50);

        assert_eq!(config.cache_lifetime, Duration::from_secs(120));
        assert_eq!(config.coalescing_timeout(), Some(Duration::from_millis(250)));
        assert!(config.coalescing_enabled());
        assert_eq!(config.max_capacity, 50);
    }

    #[test]
    fn test_non_positive_timeout_disables_coalescing() {
        for timeout in [0, -1, i64::MIN] {
            let config = CacheConfig::new().with_coalescing_timeout(timeout);
            assert!(!config.coalescing_enabled());
            assert_eq!(config.coalescing_timeout(), None);
        }
        assert!(!CacheConfig::new().without_coalescing().coalescing_enabled());
    }

    #[test]
    fn test_validate_rejects_zero_lifetime() {
        let config = CacheConfig::new().with_lifetime(Duration::ZERO);
        let err = config.validate().unwrap_err();
        assert!(matches!(err, NeonBeeError::Config(ConfigError::InvalidValue { ref field, .. }) if field == "cache_lifetime"));
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        assert!(CacheConfig::new().with_max_capacity(0).validate().is_err());
        assert!(CacheConfig::default().validate().is_ok());
    }

    #[test]
    fn test_lifetime_unit_parsing() {
        assert_eq!("ms".parse::<LifetimeUnit>().unwrap(), LifetimeUnit::Millis);
        assert_eq!("Seconds".parse::<LifetimeUnit>().unwrap(), LifetimeUnit::Seconds);
        assert_eq!("minutes".parse::<LifetimeUnit>().unwrap(), LifetimeUnit::Minutes);
        assert_eq!("h".parse::<LifetimeUnit>().unwrap(), LifetimeUnit::Hours);
        assert!("fortnights".parse::<LifetimeUnit>().is_err());
        assert_eq!(LifetimeUnit::Hours.to_duration(1), Duration::from_secs(3600));
    }

    #[test]
    fn test_node_config_defaults() {
        let config = NodeConfig::default();
        assert!(config.node_id.is_none());
        assert_eq!(config.cache, CacheConfig::default());
        assert_eq!(config.registry.lock_timeout, Duration::from_secs(10));
        assert!(config.reconciliation.enabled);
        assert_eq!(config.log_format, LogFormat::Pretty);
    }
}
