//! Operation classification table.
//!
//! # Responsibilities
//! - Map every operation kind to the backend role it requires
//! - Validate configured read-safe / primary-only sets eagerly
//!
//! # Design Decisions
//! - Lookup is a slice index: `classify` cannot fail once built
//! - A kind missing from both sets, or present in both, is a load-time error

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::routing::operation::OperationKind;

/// Backend role an operation needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Any backend may serve the operation.
    ReplicaSafe,
    /// Only the primary may serve the operation.
    PrimaryRequired,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::ReplicaSafe => f.write_str("replica_safe"),
            Role::PrimaryRequired => f.write_str("primary_required"),
        }
    }
}

/// Routing table construction errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    #[error("unclassified operation kinds: {}", join(.0))]
    Unclassified(Vec<OperationKind>),

    #[error("operation kinds listed as both replica-safe and primary-required: {}", join(.0))]
    Conflicting(Vec<OperationKind>),

    #[error("unknown operation kind: {0:?}")]
    UnknownOperation(String),
}

fn join(kinds: &[OperationKind]) -> String {
    kinds.iter().map(|k| k.name()).collect::<Vec<_>>().join(", ")
}

/// Immutable classification of operation kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingTable {
    roles: Vec<Role>,
}

impl RoutingTable {
    /// The built-in classification.
    pub fn standard() -> Self {
        Self {
            roles: OperationKind::ALL.iter().map(|k| k.standard_role()).collect(),
        }
    }

    /// Build a table from the two enumerated sets.
    ///
    /// Every kind must appear in exactly one of them.
    pub fn from_sets(
        replica_safe: &[OperationKind],
        primary_required: &[OperationKind],
    ) -> Result<Self, RoutingError> {
        let read: BTreeSet<_> = replica_safe.iter().copied().collect();
        let write: BTreeSet<_> = primary_required.iter().copied().collect();

        let conflicting: Vec<_> = read.intersection(&write).copied().collect();
        if !conflicting.is_empty() {
            return Err(RoutingError::Conflicting(conflicting));
        }

        let unclassified: Vec<_> = OperationKind::ALL
            .iter()
            .copied()
            .filter(|k| !read.contains(k) && !write.contains(k))
            .collect();
        if !unclassified.is_empty() {
            return Err(RoutingError::Unclassified(unclassified));
        }

        let roles = OperationKind::ALL
            .iter()
            .map(|k| {
                if write.contains(k) {
                    Role::PrimaryRequired
                } else {
                    Role::ReplicaSafe
                }
            })
            .collect();
        Ok(Self { roles })
    }

    /// Build a table from operation names, as found in configuration.
    pub fn from_names<S: AsRef<str>>(
        replica_safe: &[S],
        primary_required: &[S],
    ) -> Result<Self, RoutingError> {
        let read = parse_names(replica_safe)?;
        let write = parse_names(primary_required)?;
        Self::from_sets(&read, &write)
    }

    /// Role required by `kind`.
    pub fn classify(&self, kind: OperationKind) -> Role {
        self.roles[kind.index()]
    }

    /// All kinds classified with `role`, in declaration order.
    pub fn kinds_with(&self, role: Role) -> impl Iterator<Item = OperationKind> + '_ {
        OperationKind::ALL
            .iter()
            .copied()
            .filter(move |k| self.classify(*k) == role)
    }
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::standard()
    }
}

fn parse_names<S: AsRef<str>>(names: &[S]) -> Result<Vec<OperationKind>, RoutingError> {
    names.iter().map(|n| n.as_ref().parse()).collect()
}
