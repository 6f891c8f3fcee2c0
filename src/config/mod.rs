//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks, routing table compilation)
//!     → ProxyConfig (validated, immutable)
//!     → ExecutionContextRegistry builds the shared BackendSet
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → ExecutionContextRegistry::reconfigure (explicit, logged)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{BackendSpec, BalanceStrategy, ObservabilityConfig, PoolConfig, ProxyConfig, RoutingConfig};
pub use validation::{validate_config, ValidationError};
