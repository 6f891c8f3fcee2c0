//! Per-context pool selection and primary escalation.
//!
//! # Responsibilities
//! - Pick one backend per resolution cycle and pin to it
//! - Memoize one connection per pool so repeated calls share it
//! - Escalate to the primary, either scoped (`with_primary`) or sticky
//!   (`primary_connection`)
//! - Reset everything on `release`
//!
//! # Escalation
//! ```text
//! depth 0, selection = replica r1 (or none yet)
//!     escalate()            → depth 1, selection = primary
//!         escalate()        → depth 2, selection = primary
//!         scope dropped     → depth 1, selection = primary
//!     scope dropped         → depth 0, selection = r1
//!
//! primary_connection() at depth 0 → depth 1 until release()
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::backend::{BackendPool, BackendSet, ConnectionId, PoolRole};
use crate::context::ContextId;
use crate::error::ProxyResult;
use crate::observability::metrics;
use crate::proxy::connection_proxy::ConnectionProxy;

#[derive(Default)]
struct ProxyState {
    escalation_depth: usize,
    selected: Option<Arc<BackendPool>>,
    connections: HashMap<PoolRole, ConnectionProxy>,
}

pub(crate) struct PoolProxyInner {
    context: ContextId,
    backends: Arc<BackendSet>,
    state: Mutex<ProxyState>,
}

/// Backend selection and escalation state for one execution context.
///
/// Cloning is cheap and yields a handle to the same state. The state is
/// only ever touched by the context that owns it, so the mutex is
/// uncontended; it exists so the handle can cross `.await` points.
#[derive(Clone)]
pub struct PoolProxy {
    inner: Arc<PoolProxyInner>,
}

impl PoolProxy {
    pub fn new(context: ContextId, backends: Arc<BackendSet>) -> Self {
        Self {
            inner: Arc::new(PoolProxyInner {
                context,
                backends,
                state: Mutex::new(ProxyState::default()),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<PoolProxyInner>) -> Self {
        Self { inner }
    }

    fn state(&self) -> MutexGuard<'_, ProxyState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn context(&self) -> ContextId {
        self.inner.context
    }

    pub fn backends(&self) -> &Arc<BackendSet> {
        &self.inner.backends
    }

    /// Pick a pool for a new cycle without memoizing it.
    pub fn select_pool(&self) -> Arc<BackendPool> {
        self.inner.backends.select_pool()
    }

    /// The pool serving the current cycle, selected on first use.
    pub fn current_pool(&self) -> Arc<BackendPool> {
        let mut state = self.state();
        state
            .selected
            .get_or_insert_with(|| self.inner.backends.select_pool())
            .clone()
    }

    /// The pool memoized for this cycle, if any.
    pub fn selected_pool(&self) -> Option<Arc<BackendPool>> {
        self.state().selected.clone()
    }

    /// The connection for the current cycle, acquired on first use.
    pub async fn connection(&self) -> ProxyResult<ConnectionProxy> {
        let pool = self.current_pool();
        let memoized = self.state().connections.get(pool.role()).cloned();
        if let Some(existing) = memoized {
            return Ok(existing);
        }

        let pooled = pool.acquire().await?;
        let is_primary = self.inner.backends.is_primary_pool(&pool);
        tracing::debug!(
            context = %self.inner.context,
            backend = %pool.label(),
            connection_id = %pooled.id(),
            "Resolved connection for cycle"
        );

        let proxy = ConnectionProxy::new(
            pooled,
            is_primary,
            Arc::downgrade(&self.inner),
            self.inner.backends.routing().clone(),
        );
        let mut state = self.state();
        Ok(state
            .connections
            .entry(pool.role().clone())
            .or_insert(proxy)
            .clone())
    }

    /// Route to the primary until the returned scope is dropped.
    ///
    /// Dropping the scope (on return, error, panic or cancellation) undoes
    /// exactly this escalation.
    pub fn escalate(&self) -> PrimaryScope {
        let primary = self.inner.backends.primary().clone();
        let mut state = self.state();
        let previous = state.selected.replace(primary);
        state.escalation_depth += 1;
        tracing::debug!(
            context = %self.inner.context,
            depth = state.escalation_depth,
            "Entered primary scope"
        );
        metrics::record_escalation("scoped");
        PrimaryScope {
            proxy: self.clone(),
            previous,
        }
    }

    /// Run `body` with a primary connection, then restore the prior selection.
    ///
    /// The body's output is returned untouched; only a failure to acquire the
    /// primary connection is reported as an error here.
    pub async fn with_primary<F, Fut, T>(&self, body: F) -> ProxyResult<T>
    where
        F: FnOnce(ConnectionProxy) -> Fut,
        Fut: Future<Output = T>,
    {
        let _scope = self.escalate();
        let connection = self.connection().await?;
        Ok(body(connection).await)
    }

    /// A primary connection that stays pinned until [`release`](Self::release).
    ///
    /// Unlike [`with_primary`](Self::with_primary) this does not revert: at
    /// depth 0 it escalates the context for the rest of the cycle.
    pub async fn primary_connection(&self) -> ProxyResult<ConnectionProxy> {
        {
            let mut state = self.state();
            if state.escalation_depth == 0 {
                state.escalation_depth = 1;
                state.selected = Some(self.inner.backends.primary().clone());
                tracing::debug!(
                    context = %self.inner.context,
                    "Pinned context to primary until release"
                );
                metrics::record_escalation("sticky");
            }
        }
        self.connection().await
    }

    pub fn using_primary(&self) -> bool {
        self.state().escalation_depth > 0
    }

    pub fn escalation_depth(&self) -> usize {
        self.state().escalation_depth
    }

    /// Whether the cycle holds any connection.
    pub fn active_connections(&self) -> bool {
        !self.state().connections.is_empty()
    }

    /// Whether the pool serving the current cycle holds an established connection.
    pub fn is_connected(&self) -> bool {
        self.current_pool().is_connected()
    }

    /// End the cycle: return connections, drop escalation and selection.
    ///
    /// Connections go back to their pools even while the caller still holds
    /// a [`ConnectionProxy`] for them.
    pub fn release(&self) {
        let held = {
            let mut state = self.state();
            state.escalation_depth = 0;
            state.selected = None;
            std::mem::take(&mut state.connections)
        };
        let returned = held.values().filter(|conn| conn.release()).count();
        if returned > 0 {
            tracing::debug!(
                context = %self.inner.context,
                connections = returned,
                "Released cycle connections"
            );
        }
    }

    /// Disconnect every pool. Connections held by this cycle are returned first.
    pub fn disconnect_all(&self) {
        let held = std::mem::take(&mut self.state().connections);
        for conn in held.values() {
            conn.release();
        }
        self.inner.backends.disconnect_all();
    }

    /// Close idle connections that report themselves inactive, in every pool.
    pub fn clear_stale_connections(&self) -> usize {
        self.inner.backends.clear_stale()
    }

    pub fn set_auto_reconnect(&self, enabled: bool) {
        self.inner.backends.set_auto_reconnect(enabled);
    }

    pub fn primary_pool(&self) -> &Arc<BackendPool> {
        self.inner.backends.primary()
    }

    pub fn replica_pools(&self) -> &std::collections::BTreeMap<String, Arc<BackendPool>> {
        self.inner.backends.replicas()
    }

    pub fn is_primary_pool(&self, pool: &BackendPool) -> bool {
        self.inner.backends.is_primary_pool(pool)
    }

    pub fn is_replica_pool(&self, pool: &BackendPool) -> bool {
        self.inner.backends.is_replica_pool(pool)
    }

    pub fn pool_owning_connection(&self, id: ConnectionId) -> Option<&Arc<BackendPool>> {
        self.inner.backends.pool_owning_connection(id)
    }

    /// `primary`, `replica=<name>` or `unknown`.
    pub fn connection_label(&self, id: ConnectionId) -> String {
        self.inner.backends.connection_label(id)
    }
}

impl fmt::Debug for PoolProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("PoolProxy")
            .field("context", &self.inner.context)
            .field("escalation_depth", &state.escalation_depth)
            .field("selected", &state.selected.as_ref().map(|p| p.label().to_string()))
            .field("connections", &state.connections.len())
            .finish()
    }
}

/// Guard returned by [`PoolProxy::escalate`].
#[must_use = "the escalation ends when the scope is dropped"]
pub struct PrimaryScope {
    proxy: PoolProxy,
    previous: Option<Arc<BackendPool>>,
}

impl Drop for PrimaryScope {
    fn drop(&mut self) {
        let mut state = self.proxy.state();
        state.escalation_depth = state.escalation_depth.saturating_sub(1);
        // An outer scope dropped before an inner one must not un-pin the primary.
        state.selected = if state.escalation_depth > 0 {
            Some(self.proxy.inner.backends.primary().clone())
        } else {
            self.previous.take()
        };
        tracing::debug!(
            context = %self.proxy.inner.context,
            depth = state.escalation_depth,
            "Left primary scope"
        );
    }
}
