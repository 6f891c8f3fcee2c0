//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Pools, proxies and the registry produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters and gauges)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Whatever metrics recorder the host installs
//! ```
//!
//! # Design Decisions
//! - Structured fields: context, backend, connection_id, depth
//! - Metrics are no-ops until the host installs a recorder
//! - Statement-level logging belongs to the host; it can annotate statements
//!   through `BackendSet::connection_label`

pub mod logging;
pub mod metrics;
