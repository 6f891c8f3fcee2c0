//! The shared set of backend pools.
//!
//! # Responsibilities
//! - Build one pool for the primary and one per named replica
//! - Choose a pool for a new resolution cycle
//! - Answer identity questions (which pool is this, who owns that connection)
//! - Fan lifecycle calls out to every pool

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::backend::connection::{ConnectionId, Connector};
use crate::backend::pool::{BackendPool, PoolRole};
use crate::config::ProxyConfig;
use crate::load_balancer::{self, LoadBalancer};
use crate::routing::RoutingTable;

/// Primary and replica pools, shared by every execution context.
#[derive(Debug)]
pub struct BackendSet {
    primary: Arc<BackendPool>,
    replicas: BTreeMap<String, Arc<BackendPool>>,
    /// Same pools as `replicas`, in name order, for the balancer.
    replica_list: Vec<Arc<BackendPool>>,
    balancer: Box<dyn LoadBalancer>,
    routing: Arc<RoutingTable>,
}

impl BackendSet {
    /// Create the pools described by a validated configuration.
    pub fn new(config: &ProxyConfig, routing: RoutingTable, connector: Arc<dyn Connector>) -> Self {
        let timeout = config.pool.acquire_timeout();
        let auto_reconnect = config.pool.auto_reconnect;

        let primary = Arc::new(BackendPool::new(
            PoolRole::Primary,
            config.primary.clone(),
            connector.clone(),
            timeout,
            auto_reconnect,
        ));

        let replicas: BTreeMap<_, _> = config
            .replicas
            .iter()
            .map(|(name, spec)| {
                let pool = BackendPool::new(
                    PoolRole::Replica(name.clone()),
                    spec.clone(),
                    connector.clone(),
                    timeout,
                    auto_reconnect,
                );
                (name.clone(), Arc::new(pool))
            })
            .collect();
        let replica_list = replicas.values().cloned().collect();

        tracing::info!(
            primary = %config.primary.redacted_url(),
            replicas = replicas.len(),
            balance = ?config.pool.balance,
            "Backend pools created"
        );

        Self {
            primary,
            replicas,
            replica_list,
            balancer: load_balancer::for_strategy(config.pool.balance),
            routing: Arc::new(routing),
        }
    }

    pub fn primary(&self) -> &Arc<BackendPool> {
        &self.primary
    }

    /// Replica pools keyed by configured name.
    pub fn replicas(&self) -> &BTreeMap<String, Arc<BackendPool>> {
        &self.replicas
    }

    pub fn routing(&self) -> &Arc<RoutingTable> {
        &self.routing
    }

    /// Primary first, then replicas in name order.
    pub fn pools(&self) -> impl Iterator<Item = &Arc<BackendPool>> {
        std::iter::once(&self.primary).chain(self.replica_list.iter())
    }

    /// Pool for a new resolution cycle: the primary when there are no
    /// replicas, otherwise whatever the balancer picks.
    pub fn select_pool(&self) -> Arc<BackendPool> {
        self.balancer
            .next_pool(&self.replica_list)
            .unwrap_or_else(|| self.primary.clone())
    }

    pub fn is_primary_pool(&self, pool: &BackendPool) -> bool {
        std::ptr::eq(pool, Arc::as_ptr(&self.primary))
    }

    pub fn is_replica_pool(&self, pool: &BackendPool) -> bool {
        self.replica_name(pool).is_some()
    }

    /// Configured name of `pool`, if it is one of this set's replicas.
    pub fn replica_name(&self, pool: &BackendPool) -> Option<&str> {
        self.replicas
            .iter()
            .find(|(_, candidate)| std::ptr::eq(pool, Arc::as_ptr(candidate)))
            .map(|(name, _)| name.as_str())
    }

    /// The pool that established connection `id`.
    pub fn pool_owning_connection(&self, id: ConnectionId) -> Option<&Arc<BackendPool>> {
        self.pools().find(|pool| pool.owns(id))
    }

    /// `primary`, `replica=<name>` or `unknown`, for log annotation.
    pub fn connection_label(&self, id: ConnectionId) -> String {
        match self.pool_owning_connection(id) {
            Some(pool) => pool.label().to_string(),
            None => "unknown".to_string(),
        }
    }

    pub fn disconnect_all(&self) {
        for pool in self.pools() {
            pool.disconnect();
        }
    }

    /// Returns the number of connections closed.
    pub fn clear_stale(&self) -> usize {
        self.pools().map(|pool| pool.clear_stale()).sum()
    }

    pub fn set_auto_reconnect(&self, enabled: bool) {
        for pool in self.pools() {
            pool.set_auto_reconnect(enabled);
        }
    }

    /// True if any pool holds an established connection.
    pub fn is_connected(&self) -> bool {
        self.pools().any(|pool| pool.is_connected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::{test_config, FakeConnector};

    fn set(replicas: &[&str]) -> BackendSet {
        BackendSet::new(
            &test_config(replicas),
            RoutingTable::standard(),
            Arc::new(FakeConnector::new()),
        )
    }

    #[test]
    fn test_no_replicas_selects_primary() {
        let backends = set(&[]);
        for _ in 0..100 {
            let pool = backends.select_pool();
            assert!(backends.is_primary_pool(&pool));
        }
    }

    #[test]
    fn test_selects_only_replicas() {
        let backends = set(&["r1", "r2"]);
        for _ in 0..100 {
            let pool = backends.select_pool();
            assert!(backends.is_replica_pool(&pool));
            assert!(!backends.is_primary_pool(&pool));
        }
    }

    #[test]
    fn test_identity_lookups() {
        let backends = set(&["r1", "r2"]);
        let r2 = backends.replicas()["r2"].clone();
        assert_eq!(backends.replica_name(&r2), Some("r2"));
        assert_eq!(backends.replica_name(backends.primary()), None);

        // A pool from another set is not ours, even with the same name.
        let other = set(&["r2"]);
        assert!(!backends.is_replica_pool(&other.replicas()["r2"]));
        assert!(!backends.is_primary_pool(other.primary()));

        assert_eq!(backends.pools().count(), 3);
    }

    #[tokio::test]
    async fn test_connection_owner_lookup() {
        let backends = set(&["r1"]);
        let conn = backends.replicas()["r1"].acquire().await.unwrap();

        let owner = backends.pool_owning_connection(conn.id()).unwrap();
        assert_eq!(owner.label(), "replica=r1");
        assert_eq!(backends.connection_label(conn.id()), "replica=r1");
        assert_eq!(backends.connection_label(ConnectionId::new()), "unknown");
        assert!(backends.is_connected());

        drop(conn);
        backends.disconnect_all();
        assert!(!backends.is_connected());
    }
}
