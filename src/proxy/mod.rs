//! Read/write splitting core.
//!
//! # Data Flow
//! ```text
//! caller → PoolProxy::connection()
//!     → current_pool() (memoized per cycle; primary while escalated)
//!     → BackendPool::acquire()
//!     → ConnectionProxy (tagged primary / replica)
//!
//! caller → ConnectionProxy::dispatch(kind, args)
//!     → RoutingTable::classify(kind)
//!     → own connection, or PoolProxy::primary_connection()
//! ```
//!
//! # Design Decisions
//! - Which backend (`current_pool`) is separate from which physical
//!   connection (`connection`), so one unit of work stays on one connection
//! - A write issued through a replica-pinned connection reaches the primary
//!   without re-pinning the reads
//! - Escalation state is per context and restored by RAII guards

pub mod connection_proxy;
pub mod pool_proxy;

pub use connection_proxy::ConnectionProxy;
pub use pool_proxy::{PoolProxy, PrimaryScope};
