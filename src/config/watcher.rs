//! Configuration file watcher for explicit reconfiguration.
//!
//! Changes are only ever delivered as fully validated configurations; the
//! receiver decides when to apply them (see
//! [`ExecutionContextRegistry::run_reloads`](crate::context::ExecutionContextRegistry::run_reloads)).

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::ProxyConfig;

/// Watches the configuration file and emits validated replacements.
pub struct ConfigWatcher {
    path: PathBuf,
    current: ProxyConfig,
    update_tx: mpsc::UnboundedSender<ProxyConfig>,
}

impl ConfigWatcher {
    /// Create a watcher for `path`, whose contents are currently `current`.
    ///
    /// Returns the watcher and a receiver for configuration updates.
    pub fn new(
        path: &Path,
        current: ProxyConfig,
    ) -> (Self, mpsc::UnboundedReceiver<ProxyConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                current,
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching the file in a background thread.
    ///
    /// The returned watcher must be kept alive for events to flow.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx;
        let path = self.path.clone();
        let last = Mutex::new(self.current);

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    match load_config(&path) {
                        Ok(new_config) => {
                            let mut last = last.lock().unwrap_or_else(|e| e.into_inner());
                            if *last == new_config {
                                tracing::debug!(path = ?path, "Config file touched without changes");
                                return;
                            }
                            tracing::info!(path = ?path, "Config change detected");
                            *last = new_config.clone();
                            let _ = tx.send(new_config);
                        }
                        Err(e) => {
                            tracing::error!(
                                path = ?path,
                                error = %e,
                                "Rejected config change, keeping current configuration"
                            );
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}
