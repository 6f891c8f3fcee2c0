//! Driver seam: the opaque connection handles this crate pools and routes.
//!
//! # Responsibilities
//! - Define what the proxy needs from a driver connection
//! - Define how pools open new connections
//! - Generate unique connection IDs for reverse lookup in logs

use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::future::BoxFuture;
use serde_json::Value;

use crate::config::BackendSpec;
use crate::error::DriverError;
use crate::routing::OperationKind;

/// Global atomic counter for connection IDs.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a physical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A session with one backend, supplied by the driver.
pub trait Connection: Send + Sync {
    /// Run one operation. Errors are passed to the caller untouched.
    fn execute<'a>(
        &'a self,
        kind: OperationKind,
        args: &'a Value,
    ) -> BoxFuture<'a, Result<Value, DriverError>>;

    /// Whether the session still looks usable.
    fn is_active(&self) -> bool {
        true
    }

    /// Close the session. Called at most once, when the pool discards it.
    fn close(&self) {}
}

/// Opens connections for a backend specification.
pub trait Connector: Send + Sync {
    fn connect<'a>(
        &'a self,
        spec: &'a BackendSpec,
    ) -> BoxFuture<'a, Result<Box<dyn Connection>, DriverError>>;
}
