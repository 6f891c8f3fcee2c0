//! Round-robin replica selection.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::backend::BackendPool;
use crate::load_balancer::LoadBalancer;

/// Round-robin selector.
/// Stores an internal counter shared by every context.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancer for RoundRobin {
    fn next_pool(&self, replicas: &[Arc<BackendPool>]) -> Option<Arc<BackendPool>> {
        if replicas.is_empty() {
            return None;
        }
        let index = self.counter.fetch_add(1, Ordering::Relaxed) % replicas.len();
        Some(replicas[index].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::replica_pools;

    #[test]
    fn test_round_robin() {
        let lb = RoundRobin::new();
        let replicas = replica_pools(&["r1", "r2"]);

        let s1 = lb.next_pool(&replicas).unwrap();
        assert_eq!(s1.label(), "replica=r1");

        let s2 = lb.next_pool(&replicas).unwrap();
        assert_eq!(s2.label(), "replica=r2");

        let s3 = lb.next_pool(&replicas).unwrap();
        assert_eq!(s3.label(), "replica=r1");
    }
}
