//! Read/write-splitting connection proxy.
//!
//! Routes each operation of a logical unit of work to either a replica or the
//! primary backend, with scoped and sticky escalation to primary.
//!
//! # Architecture Overview
//!
//! ```text
//!   caller ──▶ ExecutionContextRegistry ──▶ PoolProxy (per context)
//!                                              │ escalation depth, memoized pool
//!                                              ▼
//!                                         ConnectionProxy ──▶ RoutingTable
//!                                              │                 │
//!                            ReplicaSafe ◀─────┴─────▶ PrimaryRequired
//!                                 │                         │
//!                                 ▼                         ▼
//!                       replica BackendPool        primary BackendPool
//!                       (load balanced)            (shared by all contexts)
//! ```

// Core subsystems
pub mod backend;
pub mod context;
pub mod proxy;
pub mod routing;

// Supporting
pub mod config;
pub mod error;
pub mod load_balancer;
pub mod observability;

pub use backend::{BackendPool, BackendSet, Connection, ConnectionId, Connector, PoolRole, PooledConnection};
pub use config::{load_config, ProxyConfig};
pub use context::{ContextId, ExecutionContextRegistry};
pub use error::{DriverError, ProxyError, ProxyResult};
pub use proxy::{ConnectionProxy, PoolProxy, PrimaryScope};
pub use routing::{OperationKind, Role, RoutingTable};
