//! Registry of per-context pool proxies.
//!
//! # Responsibilities
//! - Lazily create one PoolProxy per context
//! - Release a context at its request/checkin boundary
//! - Tear everything down on shutdown or explicit reconfiguration

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::backend::{BackendSet, Connector};
use crate::config::{validate_config, ConfigError, ProxyConfig};
use crate::context::ContextId;
use crate::observability::metrics;
use crate::proxy::PoolProxy;
use crate::routing::RoutingTable;

/// One configuration's pools and the contexts bound to them.
struct Generation {
    config: ProxyConfig,
    backends: Arc<BackendSet>,
    proxies: DashMap<ContextId, PoolProxy>,
}

impl Generation {
    fn new(config: ProxyConfig, routing: RoutingTable, connector: Arc<dyn Connector>) -> Self {
        metrics::set_enabled(config.observability.metrics_enabled);
        let backends = Arc::new(BackendSet::new(&config, routing, connector));
        Self {
            config,
            backends,
            proxies: DashMap::new(),
        }
    }

    fn teardown(&self) {
        let contexts = self.proxies.len();
        for entry in self.proxies.iter() {
            entry.value().release();
        }
        self.proxies.clear();
        self.backends.disconnect_all();
        metrics::record_contexts(0);
        tracing::info!(contexts, "Tore down backend generation");
    }
}

/// Maps execution contexts to their PoolProxy over a shared set of pools.
pub struct ExecutionContextRegistry {
    connector: Arc<dyn Connector>,
    current: RwLock<Arc<Generation>>,
}

impl ExecutionContextRegistry {
    /// Validate `config` and create its pools. No connection is opened yet.
    pub fn new(config: ProxyConfig, connector: Arc<dyn Connector>) -> Result<Self, ConfigError> {
        let routing = validate_config(&config).map_err(ConfigError::Validation)?;
        let generation = Generation::new(config, routing, connector.clone());
        Ok(Self {
            connector,
            current: RwLock::new(Arc::new(generation)),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, Arc<Generation>> {
        self.current.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Arc<Generation>> {
        self.current.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// The PoolProxy for `context`, created on first use.
    pub fn pool_proxy_for(&self, context: &ContextId) -> PoolProxy {
        let generation = self.read();
        if let Some(existing) = generation.proxies.get(context) {
            return existing.clone();
        }

        let proxy = generation
            .proxies
            .entry(*context)
            .or_insert_with(|| {
                tracing::debug!(context = %context, "Created pool proxy");
                PoolProxy::new(*context, generation.backends.clone())
            })
            .clone();
        metrics::record_contexts(generation.proxies.len());
        proxy
    }

    /// End `context`'s unit of work: return its connections and forget it.
    ///
    /// Returns false if the context was unknown.
    pub fn release(&self, context: &ContextId) -> bool {
        let generation = self.read();
        let removed = generation.proxies.remove(context);
        let remaining = generation.proxies.len();
        drop(generation);

        match removed {
            Some((_, proxy)) => {
                proxy.release();
                metrics::record_contexts(remaining);
                true
            }
            None => false,
        }
    }

    /// Tear down every context and disconnect every pool.
    ///
    /// Fresh pools are built from the current configuration, so later lookups
    /// keep working.
    pub fn clear_all(&self) {
        let previous = {
            let mut current = self.write();
            let fresh = Generation::new(
                current.config.clone(),
                RoutingTable::clone(current.backends.routing()),
                self.connector.clone(),
            );
            std::mem::replace(&mut *current, Arc::new(fresh))
        };
        previous.teardown();
    }

    /// Replace the backend configuration.
    ///
    /// This is the only way the configuration changes at runtime. The new
    /// configuration is validated first; on success every context is torn
    /// down as in [`clear_all`](Self::clear_all).
    pub fn reconfigure(&self, config: ProxyConfig) -> Result<(), ConfigError> {
        let routing = validate_config(&config).map_err(ConfigError::Validation)?;

        let previous = {
            let mut current = self.write();
            tracing::warn!(
                old_primary = %current.config.primary.redacted_url(),
                new_primary = %config.primary.redacted_url(),
                old_replicas = ?current.config.replicas.keys().collect::<Vec<_>>(),
                new_replicas = ?config.replicas.keys().collect::<Vec<_>>(),
                contexts = current.proxies.len(),
                "Replacing backend configuration"
            );
            let fresh = Generation::new(config, routing, self.connector.clone());
            std::mem::replace(&mut *current, Arc::new(fresh))
        };
        previous.teardown();
        Ok(())
    }

    /// Apply configurations from a [`ConfigWatcher`](crate::config::watcher::ConfigWatcher)
    /// until the channel closes.
    pub async fn run_reloads(&self, mut updates: mpsc::UnboundedReceiver<ProxyConfig>) {
        while let Some(config) = updates.recv().await {
            if let Err(e) = self.reconfigure(config) {
                tracing::error!(error = %e, "Rejected configuration update");
            }
        }
        tracing::debug!("Configuration update channel closed");
    }

    /// Close stale idle connections in every pool.
    pub fn clear_stale_connections(&self) -> usize {
        self.read().backends.clear_stale()
    }

    /// Whether any context currently holds a connection.
    pub fn active_connections(&self) -> bool {
        self.read()
            .proxies
            .iter()
            .any(|entry| entry.value().active_connections())
    }

    pub fn context_count(&self) -> usize {
        self.read().proxies.len()
    }

    /// The pools of the current generation.
    pub fn backends(&self) -> Arc<BackendSet> {
        self.read().backends.clone()
    }

    /// The configuration the current pools were built from.
    pub fn config(&self) -> ProxyConfig {
        self.read().config.clone()
    }
}

impl fmt::Debug for ExecutionContextRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let generation = self.read();
        f.debug_struct("ExecutionContextRegistry")
            .field("backends", &generation.backends)
            .field("contexts", &generation.proxies.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::{test_config, FakeConnector};
    use crate::config::BackendSpec;

    fn registry(replicas: &[&str]) -> ExecutionContextRegistry {
        ExecutionContextRegistry::new(test_config(replicas), Arc::new(FakeConnector::new())).unwrap()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let err = ExecutionContextRegistry::new(
            crate::config::ProxyConfig::default(),
            Arc::new(FakeConnector::new()),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[tokio::test]
    async fn test_one_proxy_per_context() {
        let registry = registry(&["r1"]);
        let (a, b) = (ContextId::new(), ContextId::new());

        let proxy_a = registry.pool_proxy_for(&a);
        let _scope = proxy_a.escalate();

        // Same context sees the same state; another context does not.
        assert!(registry.pool_proxy_for(&a).using_primary());
        assert!(!registry.pool_proxy_for(&b).using_primary());
        assert_eq!(registry.context_count(), 2);

        // Pools are shared.
        assert!(Arc::ptr_eq(
            registry.pool_proxy_for(&a).primary_pool(),
            registry.pool_proxy_for(&b).primary_pool()
        ));
    }

    #[tokio::test]
    async fn test_release_forgets_context() {
        let registry = registry(&["r1"]);
        let ctx = ContextId::new();
        registry.pool_proxy_for(&ctx).connection().await.unwrap();
        assert!(registry.active_connections());

        assert!(registry.release(&ctx));
        assert!(!registry.release(&ctx));
        assert!(!registry.active_connections());
        assert_eq!(registry.context_count(), 0);
        assert_eq!(registry.backends().replicas()["r1"].in_use(), 0);
    }

    #[tokio::test]
    async fn test_clear_all_installs_fresh_pools() {
        let registry = registry(&["r1"]);
        let ctx = ContextId::new();
        let old = registry.pool_proxy_for(&ctx);
        old.connection().await.unwrap();
        let old_primary = old.primary_pool().clone();

        registry.clear_all();

        assert_eq!(registry.context_count(), 0);
        assert!(old_primary.is_disconnected());
        let fresh = registry.pool_proxy_for(&ctx);
        assert!(!Arc::ptr_eq(fresh.primary_pool(), &old_primary));
        assert!(fresh.connection().await.is_ok());
    }

    #[tokio::test]
    async fn test_reconfigure_replaces_backends() {
        let registry = registry(&["r1"]);
        let before = registry.backends();

        let mut config = test_config(&["r1", "r2"]);
        config.primary = BackendSpec::new("postgres://db-primary-2/app");
        registry.reconfigure(config).unwrap();

        let after = registry.backends();
        assert_eq!(after.replicas().len(), 2);
        assert_eq!(after.primary().spec().url, "postgres://db-primary-2/app");
        assert!(before.primary().is_disconnected());
    }

    #[tokio::test]
    async fn test_invalid_reconfiguration_keeps_current_pools() {
        let registry = registry(&["r1"]);
        let before = registry.backends();

        let mut config = test_config(&["r1"]);
        config.primary.url = String::new();
        assert!(registry.reconfigure(config).is_err());
        assert!(Arc::ptr_eq(&before, &registry.backends()));
    }

    #[tokio::test]
    async fn test_run_reloads_applies_updates() {
        let registry = registry(&[]);
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(test_config(&["r1"])).unwrap();
        drop(tx);

        registry.run_reloads(rx).await;
        assert_eq!(registry.backends().replicas().len(), 1);
    }

    #[test]
    fn test_concurrent_lookups_during_clear_all() {
        let registry = Arc::new(registry(&["r1", "r2"]));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let ctx = ContextId::new();
                        let proxy = registry.pool_proxy_for(&ctx);
                        assert!(proxy.is_primary_pool(proxy.primary_pool()));
                        registry.release(&ctx);
                    }
                })
            })
            .collect();

        for _ in 0..20 {
            registry.clear_all();
        }
        for handle in handles {
            handle.join().unwrap();
        }
    }
}
