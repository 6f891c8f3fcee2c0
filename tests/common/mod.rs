//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::{json, Value};

use replica_proxy::config::{BackendSpec, ProxyConfig};
use replica_proxy::{Connection, Connector, DriverError, ExecutionContextRegistry, OperationKind};

/// One operation as the driver saw it.
#[derive(Debug, Clone)]
pub struct Call {
    pub url: String,
    pub session: usize,
    pub kind: OperationKind,
}

#[derive(Debug, thiserror::Error)]
#[error("backend rejected operation: {0}")]
pub struct Rejected(pub String);

struct RecordingConnection {
    url: String,
    session: usize,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl Connection for RecordingConnection {
    fn execute<'a>(
        &'a self,
        kind: OperationKind,
        args: &'a Value,
    ) -> BoxFuture<'a, Result<Value, DriverError>> {
        async move {
            self.calls.lock().unwrap().push(Call {
                url: self.url.clone(),
                session: self.session,
                kind,
            });
            if let Some(reason) = args.get("reject").and_then(Value::as_str) {
                return Err(Box::new(Rejected(reason.to_string())) as DriverError);
            }
            Ok(json!({ "url": self.url, "session": self.session }))
        }
        .boxed()
    }
}

/// Connector that records every session it opens and every call made on it.
#[derive(Default)]
pub struct RecordingConnector {
    sessions: AtomicUsize,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl RecordingConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sessions(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

impl Connector for RecordingConnector {
    fn connect<'a>(
        &'a self,
        spec: &'a BackendSpec,
    ) -> BoxFuture<'a, Result<Box<dyn Connection>, DriverError>> {
        async move {
            let session = self.sessions.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(RecordingConnection {
                url: spec.url.clone(),
                session,
                calls: self.calls.clone(),
            }) as Box<dyn Connection>)
        }
        .boxed()
    }
}

pub const PRIMARY_URL: &str = "postgres://primary.db/app";

pub fn replica_url(name: &str) -> String {
    format!("postgres://{}.db/app", name)
}

/// Configuration with one primary and the named replicas.
pub fn config(replicas: &[&str]) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.primary = BackendSpec::new(PRIMARY_URL);
    config.pool.acquire_timeout_ms = 500;
    for name in replicas {
        config
            .replicas
            .insert(name.to_string(), BackendSpec::new(replica_url(name)));
    }
    config.observability.metrics_enabled = false;
    config
}

pub fn registry(replicas: &[&str]) -> (Arc<RecordingConnector>, Arc<ExecutionContextRegistry>) {
    let connector = RecordingConnector::new();
    let registry = ExecutionContextRegistry::new(config(replicas), connector.clone()).unwrap();
    (connector, Arc::new(registry))
}
