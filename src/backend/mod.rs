//! Backend connection subsystem.
//!
//! # Data Flow
//! ```text
//! ProxyConfig (primary + named replicas)
//!     → set.rs (one BackendPool per backend, shared process-wide)
//!     → pool.rs (acquire with bounded wait)
//!     → connection.rs (driver Connector opens a Connection)
//!     → PooledConnection lent to a PoolProxy, returned on drop
//! ```
//!
//! # Design Decisions
//! - The driver is a trait object; the core never depends on a concrete one
//! - Pools are thread-safe and shared; per-context state lives in `proxy`
//! - Connection IDs are process-unique so logs can map a connection to its pool

pub mod connection;
pub mod pool;
pub mod set;

#[cfg(test)]
pub(crate) mod testing;

pub use connection::{Connection, ConnectionId, Connector};
pub use pool::{BackendPool, PoolRole, PooledConnection};
pub use set::BackendSet;
