//! Error types surfaced by the proxy.
//!
//! Only `PoolExhausted` and `Unavailable` originate in this crate's pool
//! management. Driver failures are carried untouched inside `Backend` so the
//! caller sees exactly what the driver produced.

use std::time::Duration;
use thiserror::Error;

use crate::routing::RoutingError;

/// Error produced by a driver connection or connector.
pub type DriverError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while resolving or using a proxied connection.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// No connection could be checked out within the acquire timeout.
    #[error("Pool exhausted: no connection to {backend} within {waited:?}")]
    PoolExhausted { backend: String, waited: Duration },

    /// The pool is disconnected or the owning context was released.
    #[error("Backend {backend} unavailable: {reason}")]
    Unavailable { backend: String, reason: String },

    /// The wrapped connection (or its connector) failed.
    #[error("Backend {backend} operation failed: {source}")]
    Backend {
        backend: String,
        #[source]
        source: DriverError,
    },

    /// An operation name did not resolve to a classified kind.
    ///
    /// Produced by [`ConnectionProxy::dispatch_named`](crate::proxy::ConnectionProxy::dispatch_named);
    /// routing problems in configuration are rejected earlier, at load time.
    #[error("Misconfigured routing: {0}")]
    MisconfiguredRouting(#[from] RoutingError),
}

impl ProxyError {
    pub(crate) fn unavailable(backend: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            backend: backend.into(),
            reason: reason.into(),
        }
    }

    /// True for errors introduced by pool management rather than a driver.
    pub fn is_pool_error(&self) -> bool {
        matches!(self, Self::PoolExhausted { .. } | Self::Unavailable { .. })
    }

    /// True when the driver itself reported the failure.
    pub fn is_backend_error(&self) -> bool {
        matches!(self, Self::Backend { .. })
    }

    /// Recover the driver error exactly as it was produced.
    pub fn into_driver_error(self) -> Result<DriverError, Self> {
        match self {
            Self::Backend { source, .. } => Ok(source),
            other => Err(other),
        }
    }
}

/// Result type for proxy operations.
pub type ProxyResult<T> = Result<T, ProxyError>;
