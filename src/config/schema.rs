//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the read/write splitting proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ProxyConfig {
    /// The single writable backend.
    pub primary: BackendSpec,

    /// Read-only replicas keyed by name.
    pub replicas: BTreeMap<String, BackendSpec>,

    /// Pool behaviour shared by every backend.
    pub pool: PoolConfig,

    /// Optional replacement for the built-in operation classification.
    pub routing: Option<RoutingConfig>,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// One backend the proxy can open connections to.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct BackendSpec {
    /// Connection URL handed to the driver unchanged.
    #[serde(default)]
    pub url: String,

    /// Maximum concurrent connections to this backend.
    #[serde(default = "default_max_backend_conns")]
    pub max_connections: usize,
}

impl BackendSpec {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: default_max_backend_conns(),
        }
    }

    /// The URL with any password masked, for logs.
    pub fn redacted_url(&self) -> String {
        match url::Url::parse(&self.url) {
            Ok(mut parsed) if parsed.password().is_some() => {
                let _ = parsed.set_password(Some("***"));
                parsed.to_string()
            }
            Ok(parsed) => parsed.to_string(),
            Err(_) => self.url.clone(),
        }
    }
}

impl Default for BackendSpec {
    fn default() -> Self {
        Self::new(String::new())
    }
}

fn default_max_backend_conns() -> usize {
    5
}

/// Replica selection strategy.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BalanceStrategy {
    /// Uniformly random replica per resolution cycle.
    #[default]
    Random,
    /// Rotate through replicas.
    RoundRobin,
}

/// Pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct PoolConfig {
    /// How long `acquire` waits for a free connection, in milliseconds.
    pub acquire_timeout_ms: u64,

    /// Whether a disconnected pool re-opens on the next acquire.
    pub auto_reconnect: bool,

    /// Replica selection strategy.
    pub balance: BalanceStrategy,
}

impl PoolConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            acquire_timeout_ms: 5_000,
            auto_reconnect: false,
            balance: BalanceStrategy::Random,
        }
    }
}

/// Explicit operation classification.
///
/// Both lists are required; together they must name every operation kind.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RoutingConfig {
    pub replica_safe: Vec<String>,
    pub primary_required: Vec<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Record pool and dispatch metrics.
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
        }
    }
}
