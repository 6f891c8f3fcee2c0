//! Connection pool for a single backend.
//!
//! # Responsibilities
//! - Lend connections to one backend and take them back
//! - Bound concurrent checkouts by `max_connections`
//! - Bound the wait for a free connection by the acquire timeout
//! - Disconnect safely while acquires are in flight
//!
//! # Design Decisions
//! - Capacity is a semaphore; the permit travels with the lent connection
//! - Lent connections return through an RAII guard
//! - A generation counter marks connections lent before a disconnect, so they
//!   are closed on return instead of re-pooled
//! - The semaphore is swapped and closed on disconnect so waiters fail fast;
//!   the fresh one starts short by the connections still lent, which hand
//!   their permit over when they come back

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use arc_swap::ArcSwap;
use serde_json::Value;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time;

use crate::backend::connection::{Connection, ConnectionId, Connector};
use crate::config::BackendSpec;
use crate::error::{DriverError, ProxyError, ProxyResult};
use crate::observability::metrics;
use crate::routing::OperationKind;

/// Which backend a pool talks to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PoolRole {
    Primary,
    Replica(String),
}

impl PoolRole {
    pub fn is_primary(&self) -> bool {
        matches!(self, PoolRole::Primary)
    }

    /// The replica name, if this is a replica.
    pub fn replica_name(&self) -> Option<&str> {
        match self {
            PoolRole::Primary => None,
            PoolRole::Replica(name) => Some(name),
        }
    }
}

impl fmt::Display for PoolRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolRole::Primary => f.write_str("primary"),
            PoolRole::Replica(name) => write!(f, "replica={}", name),
        }
    }
}

struct PoolState {
    idle: Vec<(ConnectionId, Arc<dyn Connection>)>,
    /// Every established connection, idle or lent.
    owned: HashSet<ConnectionId>,
    generation: u64,
    disconnected: bool,
}

/// Reusable connections to one backend, shared by every execution context.
pub struct BackendPool {
    role: PoolRole,
    label: String,
    spec: BackendSpec,
    connector: Arc<dyn Connector>,
    acquire_timeout: Duration,
    auto_reconnect: AtomicBool,
    permits: ArcSwap<Semaphore>,
    state: Mutex<PoolState>,
}

impl BackendPool {
    /// Create a pool. No connection is opened until the first acquire.
    pub fn new(
        role: PoolRole,
        spec: BackendSpec,
        connector: Arc<dyn Connector>,
        acquire_timeout: Duration,
        auto_reconnect: bool,
    ) -> Self {
        Self {
            label: role.to_string(),
            role,
            permits: ArcSwap::from_pointee(Semaphore::new(spec.max_connections)),
            spec,
            connector,
            acquire_timeout,
            auto_reconnect: AtomicBool::new(auto_reconnect),
            state: Mutex::new(PoolState {
                idle: Vec::new(),
                owned: HashSet::new(),
                generation: 0,
                disconnected: false,
            }),
        }
    }

    pub fn role(&self) -> &PoolRole {
        &self.role
    }

    /// `primary` or `replica=<name>`.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn spec(&self) -> &BackendSpec {
        &self.spec
    }

    pub fn capacity(&self) -> usize {
        self.spec.max_connections
    }

    fn state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Check out a connection, waiting at most the acquire timeout.
    pub async fn acquire(self: &Arc<Self>) -> ProxyResult<PooledConnection> {
        self.ensure_open()?;

        let (generation, permits) = {
            let state = self.state();
            (state.generation, self.permits.load_full())
        };
        let permit = match time::timeout(self.acquire_timeout, permits.acquire_owned()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => {
                metrics::record_acquire(&self.label, "unavailable");
                return Err(ProxyError::unavailable(
                    &self.label,
                    "pool disconnected while waiting for a connection",
                ));
            }
            Err(_) => {
                tracing::warn!(
                    backend = %self.label,
                    timeout = ?self.acquire_timeout,
                    capacity = self.capacity(),
                    "Timed out waiting for a connection"
                );
                metrics::record_acquire(&self.label, "exhausted");
                return Err(ProxyError::PoolExhausted {
                    backend: self.label.clone(),
                    waited: self.acquire_timeout,
                });
            }
        };

        let reused = {
            let mut state = self.state();
            if state.disconnected || state.generation != generation {
                metrics::record_acquire(&self.label, "unavailable");
                return Err(ProxyError::unavailable(
                    &self.label,
                    "pool disconnected while waiting for a connection",
                ));
            }
            state.idle.pop()
        };

        let (id, conn) = match reused {
            Some(idle) => idle,
            None => self.open(generation).await?,
        };

        metrics::record_acquire(&self.label, "ok");
        Ok(PooledConnection {
            id,
            conn,
            generation,
            pool: Arc::clone(self),
            _permit: permit,
        })
    }

    async fn open(&self, generation: u64) -> ProxyResult<(ConnectionId, Arc<dyn Connection>)> {
        let conn: Arc<dyn Connection> = match self.connector.connect(&self.spec).await {
            Ok(conn) => Arc::from(conn),
            Err(source) => {
                tracing::error!(backend = %self.label, error = %source, "Failed to open connection");
                metrics::record_acquire(&self.label, "connect_failed");
                return Err(ProxyError::Backend {
                    backend: self.label.clone(),
                    source,
                });
            }
        };

        let id = ConnectionId::new();
        let mut state = self.state();
        if state.disconnected || state.generation != generation {
            drop(state);
            conn.close();
            metrics::record_acquire(&self.label, "unavailable");
            return Err(ProxyError::unavailable(
                &self.label,
                "pool disconnected while connecting",
            ));
        }
        state.owned.insert(id);
        tracing::debug!(
            backend = %self.label,
            connection_id = %id,
            open = state.owned.len(),
            "Opened connection"
        );
        Ok((id, conn))
    }

    fn ensure_open(&self) -> ProxyResult<()> {
        let mut state = self.state();
        if state.disconnected {
            if !self.auto_reconnect.load(Ordering::Acquire) {
                metrics::record_acquire(&self.label, "unavailable");
                return Err(ProxyError::unavailable(&self.label, "pool is disconnected"));
            }
            state.disconnected = false;
            tracing::info!(backend = %self.label, "Reconnecting disconnected pool");
        }
        Ok(())
    }

    /// Return a lent connection. Equivalent to dropping it.
    pub fn release(&self, conn: PooledConnection) {
        debug_assert_eq!(conn.pool.role, self.role, "connection returned to the wrong pool");
        drop(conn);
    }

    fn reclaim(&self, id: ConnectionId, conn: &Arc<dyn Connection>, generation: u64) {
        let mut state = self.state();
        if !state.disconnected && state.generation == generation && conn.is_active() {
            state.idle.push((id, Arc::clone(conn)));
            return;
        }
        state.owned.remove(&id);
        if state.generation != generation {
            // Lent before a disconnect: its permit belongs to a closed semaphore.
            self.permits.load().add_permits(1);
        }
        drop(state);
        conn.close();
        tracing::debug!(backend = %self.label, connection_id = %id, "Closed returned connection");
    }

    /// True while the pool owns at least one established connection.
    pub fn is_connected(&self) -> bool {
        !self.state().owned.is_empty()
    }

    /// True when the pool has been disconnected and not re-opened.
    pub fn is_disconnected(&self) -> bool {
        self.state().disconnected
    }

    /// Whether `id` was established by this pool and is still open.
    pub fn owns(&self, id: ConnectionId) -> bool {
        self.state().owned.contains(&id)
    }

    /// Number of idle connections waiting for reuse.
    pub fn idle_count(&self) -> usize {
        self.state().idle.len()
    }

    /// Number of connections currently lent out.
    pub fn in_use(&self) -> usize {
        let state = self.state();
        state.owned.len() - state.idle.len()
    }

    pub fn set_auto_reconnect(&self, enabled: bool) {
        self.auto_reconnect.store(enabled, Ordering::Release);
    }

    pub fn auto_reconnect(&self) -> bool {
        self.auto_reconnect.load(Ordering::Acquire)
    }

    /// Close every idle connection and refuse further acquires.
    ///
    /// Lent connections are closed when they come back. Idempotent.
    pub fn disconnect(&self) {
        let closing = {
            let mut state = self.state();
            state.disconnected = true;
            state.generation += 1;
            let idle = std::mem::take(&mut state.idle);
            for (id, _) in &idle {
                state.owned.remove(id);
            }

            let lent = state.owned.len();
            let previous = self.permits.swap(Arc::new(Semaphore::new(
                self.spec.max_connections.saturating_sub(lent),
            )));
            previous.close();
            idle
        };

        for (_, conn) in &closing {
            conn.close();
        }
        tracing::info!(backend = %self.label, closed = closing.len(), "Pool disconnected");
    }

    /// Close idle connections that no longer report themselves active.
    pub fn clear_stale(&self) -> usize {
        let stale: Vec<_> = {
            let mut state = self.state();
            let (live, stale): (Vec<_>, Vec<_>) = std::mem::take(&mut state.idle)
                .into_iter()
                .partition(|(_, conn)| conn.is_active());
            state.idle = live;
            for (id, _) in &stale {
                state.owned.remove(id);
            }
            stale
        };

        for (_, conn) in &stale {
            conn.close();
        }
        if !stale.is_empty() {
            tracing::info!(backend = %self.label, closed = stale.len(), "Cleared stale connections");
        }
        stale.len()
    }
}

impl fmt::Debug for BackendPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendPool")
            .field("role", &self.role)
            .field("url", &self.spec.redacted_url())
            .field("max_connections", &self.spec.max_connections)
            .finish()
    }
}

/// A connection lent by a [`BackendPool`], returned when dropped.
pub struct PooledConnection {
    id: ConnectionId,
    conn: Arc<dyn Connection>,
    generation: u64,
    pool: Arc<BackendPool>,
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// The pool this connection came from.
    pub fn pool(&self) -> &Arc<BackendPool> {
        &self.pool
    }

    pub async fn execute(&self, kind: OperationKind, args: &Value) -> Result<Value, DriverError> {
        self.conn.execute(kind, args).await
    }

    pub fn is_active(&self) -> bool {
        self.conn.is_active()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        self.pool.reclaim(self.id, &self.conn, self.generation);
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("backend", &self.pool.label)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::FakeConnector;

    fn pool(connector: &Arc<FakeConnector>, capacity: usize, timeout_ms: u64) -> Arc<BackendPool> {
        let mut spec = BackendSpec::new("postgres://db-primary/app");
        spec.max_connections = capacity;
        Arc::new(BackendPool::new(
            PoolRole::Primary,
            spec,
            connector.clone(),
            Duration::from_millis(timeout_ms),
            false,
        ))
    }

    #[tokio::test]
    async fn test_reuses_returned_connection() {
        let connector = Arc::new(FakeConnector::new());
        let pool = pool(&connector, 2, 100);

        let first = pool.acquire().await.unwrap();
        let id = first.id();
        assert!(pool.owns(id));
        assert_eq!(pool.in_use(), 1);
        pool.release(first);
        assert_eq!(pool.idle_count(), 1);

        let second = pool.acquire().await.unwrap();
        assert_eq!(second.id(), id);
        assert_eq!(connector.opened(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_after_timeout() {
        let connector = Arc::new(FakeConnector::new());
        let pool = pool(&connector, 1, 20);

        let _held = pool.acquire().await.unwrap();
        let err = pool.acquire().await.unwrap_err();
        assert!(matches!(err, ProxyError::PoolExhausted { .. }));
        assert!(err.is_pool_error());
    }

    #[tokio::test]
    async fn test_waiter_gets_connection_when_released() {
        let connector = Arc::new(FakeConnector::new());
        let pool = pool(&connector, 1, 1_000);

        let held = pool.acquire().await.unwrap();
        let id = held.id();
        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire().await.map(|c| c.id()) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(held);

        assert_eq!(waiter.await.unwrap().unwrap(), id);
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent_and_refuses_acquires() {
        let connector = Arc::new(FakeConnector::new());
        let pool = pool(&connector, 2, 100);

        drop(pool.acquire().await.unwrap());
        assert!(pool.is_connected());

        pool.disconnect();
        pool.disconnect();
        assert!(!pool.is_connected());
        assert_eq!(connector.closed(), 1);

        let err = pool.acquire().await.unwrap_err();
        assert!(matches!(err, ProxyError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn test_disconnect_fails_pending_acquire() {
        let connector = Arc::new(FakeConnector::new());
        let pool = pool(&connector, 1, 5_000);

        let held = pool.acquire().await.unwrap();
        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        pool.disconnect();

        let err = waiter.await.unwrap().unwrap_err();
        assert!(matches!(err, ProxyError::Unavailable { .. }));

        // The lent connection is closed on return rather than re-pooled.
        let id = held.id();
        drop(held);
        assert!(!pool.owns(id));
        assert_eq!(pool.idle_count(), 0);
    }

    #[tokio::test]
    async fn test_auto_reconnect_reopens_pool() {
        let connector = Arc::new(FakeConnector::new());
        let pool = pool(&connector, 1, 100);

        pool.disconnect();
        assert!(pool.acquire().await.is_err());

        pool.set_auto_reconnect(true);
        let conn = pool.acquire().await.unwrap();
        assert!(pool.owns(conn.id()));
        assert!(!pool.is_disconnected());
    }

    #[tokio::test]
    async fn test_reconnect_counts_connections_lent_before_disconnect() {
        let connector = Arc::new(FakeConnector::new());
        let pool = pool(&connector, 1, 50);
        pool.set_auto_reconnect(true);

        let held = pool.acquire().await.unwrap();
        pool.disconnect();

        // The old connection still occupies the only slot.
        let err = pool.acquire().await.unwrap_err();
        assert!(matches!(err, ProxyError::PoolExhausted { .. }));
        assert_eq!(pool.in_use(), 1);
        assert_eq!(connector.opened(), 1);

        let old_id = held.id();
        drop(held);
        assert!(!pool.owns(old_id));

        let conn = pool.acquire().await.unwrap();
        assert_ne!(conn.id(), old_id);
        assert_eq!(pool.in_use(), 1);
        assert_eq!(connector.opened(), 2);

        // Capacity is back to exactly one.
        assert!(pool.acquire().await.is_err());
    }

    #[tokio::test]
    async fn test_connect_failure_is_backend_error() {
        let connector = Arc::new(FakeConnector::new());
        connector.fail_connects(true);
        let pool = pool(&connector, 1, 100);

        let err = pool.acquire().await.unwrap_err();
        assert!(err.is_backend_error());
        // The permit is handed back, so a later attempt is not starved.
        connector.fail_connects(false);
        assert!(pool.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn test_clear_stale_closes_inactive_idle_connections() {
        let connector = Arc::new(FakeConnector::new());
        let pool = pool(&connector, 2, 100);

        let a = pool.acquire().await.unwrap();
        let b = pool.acquire().await.unwrap();
        let (stale_id, live_id) = (a.id(), b.id());
        drop(a);
        drop(b);
        assert_eq!(pool.idle_count(), 2);

        // `a` was opened first.
        connector.mark_inactive(0);
        assert_eq!(pool.clear_stale(), 1);
        assert!(!pool.owns(stale_id));
        assert!(pool.owns(live_id));
        assert_eq!(connector.closed(), 1);
    }

    #[tokio::test]
    async fn test_inactive_connection_is_not_repooled() {
        let connector = Arc::new(FakeConnector::new());
        let pool = pool(&connector, 1, 100);

        let conn = pool.acquire().await.unwrap();
        let id = conn.id();
        connector.mark_inactive(0);
        drop(conn);

        assert!(!pool.owns(id));
        assert_eq!(pool.idle_count(), 0);
    }
}
