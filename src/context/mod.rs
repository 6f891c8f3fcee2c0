//! Execution contexts.
//!
//! A context is one logical unit of work (a request, a job, a task). Each
//! context gets its own [`PoolProxy`](crate::proxy::PoolProxy); all contexts
//! share the same backend pools.
//!
//! # Design Decisions
//! - Contexts are explicit handles passed by the caller, never derived from
//!   thread identity
//! - The registry swaps whole generations under one write lock, so lookups
//!   never see a half-torn-down set of pools

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod registry;

pub use registry::ExecutionContextRegistry;

/// Handle identifying one logical unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContextId(Uuid);

impl ContextId {
    /// A fresh, random context handle.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for ContextId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}
