//! Uniform random replica selection.

use std::sync::Arc;

use rand::seq::SliceRandom;

use crate::backend::BackendPool;
use crate::load_balancer::LoadBalancer;

/// Picks each replica with equal probability.
#[derive(Debug, Default)]
pub struct Random;

impl Random {
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancer for Random {
    fn next_pool(&self, replicas: &[Arc<BackendPool>]) -> Option<Arc<BackendPool>> {
        replicas.choose(&mut rand::thread_rng()).cloned()
    }
}
