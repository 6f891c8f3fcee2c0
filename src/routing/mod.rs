//! Operation routing subsystem.
//!
//! # Data Flow
//! ```text
//! ConnectionProxy::dispatch(kind, args)
//!     → table.rs (classify kind)
//!     → Role::ReplicaSafe | Role::PrimaryRequired
//!     → connection_proxy.rs picks own connection or the primary
//!
//! Table Compilation (at startup):
//!     standard classification or [routing] overrides
//!     → operation.rs (resolve names to kinds)
//!     → table.rs (check every kind is in exactly one set)
//!     → Freeze as immutable RoutingTable
//! ```
//!
//! # Design Decisions
//! - Classification by exact operation kind, never by statement text
//! - Table compiled at startup, immutable at runtime
//! - Explicit rejection of unclassified kinds rather than a silent default

pub mod operation;
pub mod table;

pub use operation::OperationKind;
pub use table::{Role, RoutingError, RoutingTable};
