//! In-memory driver used by unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::{json, Value};

use crate::backend::connection::{Connection, Connector};
use crate::config::BackendSpec;
use crate::error::DriverError;
use crate::routing::OperationKind;

#[derive(Debug, thiserror::Error)]
#[error("driver failure: {0}")]
pub(crate) struct FakeDriverError(pub String);

/// One executed operation, as seen by the driver.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Executed {
    pub url: String,
    pub serial: usize,
    pub kind: OperationKind,
}

struct Shared {
    log: Mutex<Vec<Executed>>,
    closed: AtomicUsize,
}

struct FakeConnection {
    url: String,
    serial: usize,
    active: Arc<AtomicBool>,
    shared: Arc<Shared>,
}

impl Connection for FakeConnection {
    fn execute<'a>(
        &'a self,
        kind: OperationKind,
        args: &'a Value,
    ) -> BoxFuture<'a, Result<Value, DriverError>> {
        async move {
            self.shared.log.lock().unwrap().push(Executed {
                url: self.url.clone(),
                serial: self.serial,
                kind,
            });
            if let Some(message) = args.get("fail").and_then(Value::as_str) {
                return Err(Box::new(FakeDriverError(message.to_string())) as DriverError);
            }
            Ok(json!({ "url": self.url, "serial": self.serial }))
        }
        .boxed()
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.shared.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Connector that opens in-memory connections and records their use.
pub(crate) struct FakeConnector {
    opened: Mutex<Vec<Arc<AtomicBool>>>,
    fail: AtomicBool,
    shared: Arc<Shared>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self {
            opened: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
            shared: Arc::new(Shared {
                log: Mutex::new(Vec::new()),
                closed: AtomicUsize::new(0),
            }),
        }
    }

    pub fn opened(&self) -> usize {
        self.opened.lock().unwrap().len()
    }

    pub fn closed(&self) -> usize {
        self.shared.closed.load(Ordering::SeqCst)
    }

    pub fn fail_connects(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Mark the `n`th opened connection (0-based) as no longer active.
    pub fn mark_inactive(&self, n: usize) {
        self.opened.lock().unwrap()[n].store(false, Ordering::SeqCst);
    }

    pub fn executed(&self) -> Vec<Executed> {
        self.shared.log.lock().unwrap().clone()
    }
}

impl Connector for FakeConnector {
    fn connect<'a>(
        &'a self,
        spec: &'a BackendSpec,
    ) -> BoxFuture<'a, Result<Box<dyn Connection>, DriverError>> {
        async move {
            if self.fail.load(Ordering::SeqCst) {
                return Err(Box::new(FakeDriverError("connection refused".into())) as DriverError);
            }
            let active = Arc::new(AtomicBool::new(true));
            let serial = {
                let mut opened = self.opened.lock().unwrap();
                opened.push(active.clone());
                opened.len() - 1
            };
            Ok(Box::new(FakeConnection {
                url: spec.url.clone(),
                serial,
                active,
                shared: self.shared.clone(),
            }) as Box<dyn Connection>)
        }
        .boxed()
    }
}

/// Replica pools backed by a throwaway connector.
pub(crate) fn replica_pools(names: &[&str]) -> Vec<Arc<crate::backend::BackendPool>> {
    let connector: Arc<dyn Connector> = Arc::new(FakeConnector::new());
    names
        .iter()
        .map(|name| {
            Arc::new(crate::backend::BackendPool::new(
                crate::backend::PoolRole::Replica(name.to_string()),
                BackendSpec::new(format!("postgres://db-{}/app", name)),
                connector.clone(),
                std::time::Duration::from_millis(100),
                false,
            ))
        })
        .collect()
}

/// A valid configuration with the given replica names.
pub(crate) fn test_config(replicas: &[&str]) -> crate::config::ProxyConfig {
    let mut config = crate::config::ProxyConfig::default();
    config.primary = BackendSpec::new("postgres://db-primary/app");
    config.pool.acquire_timeout_ms = 200;
    for name in replicas {
        config.replicas.insert(
            name.to_string(),
            BackendSpec::new(format!("postgres://db-{}/app", name)),
        );
    }
    config
}
