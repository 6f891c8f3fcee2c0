//! Per-call dispatch between a pinned connection and the primary.
//!
//! | connection is primary | role             | executes on                  |
//! |-----------------------|------------------|------------------------------|
//! | yes                   | any              | own connection               |
//! | no                    | ReplicaSafe      | own connection (the replica) |
//! | no                    | PrimaryRequired  | owner's `primary_connection` |

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use serde_json::Value;

use crate::backend::{BackendPool, ConnectionId, PooledConnection};
use crate::error::{ProxyError, ProxyResult};
use crate::observability::metrics;
use crate::proxy::pool_proxy::{PoolProxy, PoolProxyInner};
use crate::routing::{OperationKind, Role, RoutingTable};

/// Holds the lent connection until the owning cycle is released.
///
/// An operation already in flight keeps its own handle, so the connection goes
/// back to the pool once that operation finishes.
type Slot = Mutex<Option<Arc<PooledConnection>>>;

/// A connection resolved for one cycle, plus the routing needed to use it.
///
/// Clones share the same physical connection. Releasing the owning
/// [`PoolProxy`] returns it to its pool for every clone; later dispatches
/// through a clone fail with [`ProxyError::Unavailable`].
#[derive(Clone)]
pub struct ConnectionProxy {
    id: ConnectionId,
    pool: Arc<BackendPool>,
    slot: Arc<Slot>,
    is_primary: bool,
    owner: Weak<PoolProxyInner>,
    routing: Arc<RoutingTable>,
}

impl ConnectionProxy {
    pub(crate) fn new(
        connection: PooledConnection,
        is_primary: bool,
        owner: Weak<PoolProxyInner>,
        routing: Arc<RoutingTable>,
    ) -> Self {
        Self {
            id: connection.id(),
            pool: connection.pool().clone(),
            slot: Arc::new(Mutex::new(Some(Arc::new(connection)))),
            is_primary,
            owner,
            routing,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn is_primary(&self) -> bool {
        self.is_primary
    }

    pub fn pool(&self) -> &Arc<BackendPool> {
        &self.pool
    }

    /// `primary` or `replica=<name>`.
    pub fn backend(&self) -> &str {
        self.pool.label()
    }

    /// Whether the connection has been handed back to its pool.
    pub fn is_released(&self) -> bool {
        self.slot().is_none()
    }

    /// Hand the connection back to its pool. Returns false if it already was.
    pub(crate) fn release(&self) -> bool {
        self.slot().take().is_some()
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<Arc<PooledConnection>>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn checked_out(&self) -> ProxyResult<Arc<PooledConnection>> {
        self.slot()
            .clone()
            .ok_or_else(|| ProxyError::unavailable(self.backend(), "connection was released"))
    }

    /// Run `kind` on whichever backend its role requires.
    ///
    /// Driver errors come back as [`ProxyError::Backend`] with the original
    /// error as source. Nothing is retried.
    pub async fn dispatch(&self, kind: OperationKind, args: &Value) -> ProxyResult<Value> {
        let connection = self.checked_out()?;
        let role = self.routing.classify(kind);
        if self.is_primary || role == Role::ReplicaSafe {
            return self.execute(&connection, kind, role, args).await;
        }
        drop(connection);

        let owner = self.owner()?;
        let primary = owner.primary_connection().await?;
        if !primary.is_primary {
            return Err(ProxyError::unavailable(
                primary.backend(),
                "primary-required operation resolved to a non-primary connection",
            ));
        }
        tracing::trace!(
            context = %owner.context(),
            operation = %kind,
            from = %self.backend(),
            connection_id = %primary.id(),
            "Routing to primary"
        );
        let connection = primary.checked_out()?;
        primary.execute(&connection, kind, role, args).await
    }

    /// Like [`dispatch`](Self::dispatch), for callers that name operations
    /// by their wire name.
    pub async fn dispatch_named(&self, operation: &str, args: &Value) -> ProxyResult<Value> {
        let kind: OperationKind = operation.parse()?;
        self.dispatch(kind, args).await
    }

    async fn execute(
        &self,
        connection: &PooledConnection,
        kind: OperationKind,
        role: Role,
        args: &Value,
    ) -> ProxyResult<Value> {
        metrics::record_dispatch(self.backend(), role);
        connection
            .execute(kind, args)
            .await
            .map_err(|source| ProxyError::Backend {
                backend: self.backend().to_string(),
                source,
            })
    }

    fn owner(&self) -> ProxyResult<PoolProxy> {
        self.owner
            .upgrade()
            .map(PoolProxy::from_inner)
            .ok_or_else(|| ProxyError::unavailable(self.backend(), "execution context was released"))
    }
}

impl fmt::Debug for ConnectionProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionProxy")
            .field("id", &self.id())
            .field("backend", &self.backend())
            .field("is_primary", &self.is_primary)
            .field("released", &self.is_released())
            .finish()
    }
}
