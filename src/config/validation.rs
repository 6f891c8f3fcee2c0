//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check every backend URL parses and every pool has capacity
//! - Compile the routing overrides so unclassified kinds fail at load time
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<RoutingTable, Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;

use crate::config::schema::{BackendSpec, ProxyConfig};
use crate::routing::{RoutingError, RoutingTable};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{backend}: url is empty")]
    MissingUrl { backend: String },

    #[error("{backend}: invalid url {url:?}: {reason}")]
    InvalidUrl {
        backend: String,
        url: String,
        reason: String,
    },

    #[error("{backend}: max_connections must be greater than 0")]
    ZeroCapacity { backend: String },

    #[error("replica names must not be empty")]
    EmptyReplicaName,

    #[error("pool.acquire_timeout_ms must be greater than 0")]
    ZeroAcquireTimeout,

    #[error("routing: {0}")]
    Routing(#[from] RoutingError),
}

/// Validate `config` and compile its routing table.
pub fn validate_config(config: &ProxyConfig) -> Result<RoutingTable, Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_backend("primary", &config.primary, &mut errors);
    for (name, spec) in &config.replicas {
        if name.trim().is_empty() {
            errors.push(ValidationError::EmptyReplicaName);
            continue;
        }
        check_backend(&format!("replica={}", name), spec, &mut errors);
    }

    if config.pool.acquire_timeout_ms == 0 {
        errors.push(ValidationError::ZeroAcquireTimeout);
    }

    let routing = match &config.routing {
        Some(overrides) => {
            RoutingTable::from_names(&overrides.replica_safe, &overrides.primary_required)
        }
        None => Ok(RoutingTable::standard()),
    };

    match routing {
        Ok(table) if errors.is_empty() => Ok(table),
        Ok(_) => Err(errors),
        Err(e) => {
            errors.push(e.into());
            Err(errors)
        }
    }
}

fn check_backend(label: &str, spec: &BackendSpec, errors: &mut Vec<ValidationError>) {
    if spec.url.trim().is_empty() {
        errors.push(ValidationError::MissingUrl {
            backend: label.to_string(),
        });
    } else if let Err(e) = url::Url::parse(&spec.url) {
        errors.push(ValidationError::InvalidUrl {
            backend: label.to_string(),
            url: spec.url.clone(),
            reason: e.to_string(),
        });
    }

    if spec.max_connections == 0 {
        errors.push(ValidationError::ZeroCapacity {
            backend: label.to_string(),
        });
    }
}
