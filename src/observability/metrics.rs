//! Metrics recording.
//!
//! # Metrics
//! - `replica_proxy_acquire_total` (counter): acquires by backend and outcome
//! - `replica_proxy_dispatch_total` (counter): operations by backend and role
//! - `replica_proxy_escalations_total` (counter): scoped vs sticky escalations
//! - `replica_proxy_contexts` (gauge): live execution contexts

use std::sync::atomic::{AtomicBool, Ordering};

use metrics::{counter, gauge};

use crate::routing::Role;

static ENABLED: AtomicBool = AtomicBool::new(true);

/// Turn recording on or off process-wide.
pub fn set_enabled(enabled: bool) {
    ENABLED.store(enabled, Ordering::Relaxed);
}

fn enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

pub fn record_acquire(backend: &str, outcome: &'static str) {
    if enabled() {
        counter!(
            "replica_proxy_acquire_total",
            "backend" => backend.to_string(),
            "outcome" => outcome
        )
        .increment(1);
    }
}

pub fn record_dispatch(backend: &str, role: Role) {
    if enabled() {
        counter!(
            "replica_proxy_dispatch_total",
            "backend" => backend.to_string(),
            "role" => role.to_string()
        )
        .increment(1);
    }
}

/// `kind` is `scoped` for `with_primary`, `sticky` for `primary_connection`.
pub fn record_escalation(kind: &'static str) {
    if enabled() {
        counter!("replica_proxy_escalations_total", "kind" => kind).increment(1);
    }
}

pub fn record_contexts(count: usize) {
    if enabled() {
        gauge!("replica_proxy_contexts").set(count as f64);
    }
}
