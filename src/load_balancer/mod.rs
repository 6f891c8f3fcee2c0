//! Replica selection subsystem.
//!
//! # Data Flow
//! ```text
//! PoolProxy::current_pool (once per resolution cycle)
//!     → no replicas configured → primary pool
//!     → otherwise apply the configured algorithm:
//!         - random.rs (uniform pick, the default)
//!         - round_robin.rs (rotate through replicas)
//!     → memoized until the cycle is released
//! ```
//!
//! # Design Decisions
//! - Selectors are stateless apart from the round-robin counter
//! - Selection happens per cycle, never per call
//! - No health filtering: a failing replica surfaces its error to the caller

use std::sync::Arc;

use crate::backend::BackendPool;
use crate::config::BalanceStrategy;

pub mod random;
pub mod round_robin;

pub use random::Random;
pub use round_robin::RoundRobin;

/// Picks one replica pool out of the configured set.
pub trait LoadBalancer: Send + Sync + std::fmt::Debug {
    /// Returns `None` only when `replicas` is empty.
    fn next_pool(&self, replicas: &[Arc<BackendPool>]) -> Option<Arc<BackendPool>>;
}

/// Build the selector for a configured strategy.
pub fn for_strategy(strategy: BalanceStrategy) -> Box<dyn LoadBalancer> {
    match strategy {
        BalanceStrategy::Random => Box::new(Random::new()),
        BalanceStrategy::RoundRobin => Box::new(RoundRobin::new()),
    }
}
