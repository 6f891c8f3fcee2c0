//! `replica-proxy` command line.
//!
//! Offline tooling around a proxy configuration: validate it, print the
//! effective routing table, or follow reloads the way a running host would.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde_json::{json, Value};

use replica_proxy::config::watcher::ConfigWatcher;
use replica_proxy::config::{load_config, validate_config, ObservabilityConfig, ProxyConfig};
use replica_proxy::observability::logging;
use replica_proxy::routing::{OperationKind, Role, RoutingTable};

#[derive(Parser)]
#[command(name = "replica-proxy")]
#[command(about = "Read/write-splitting connection proxy tooling", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a configuration file and summarize its backends
    Check {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Print how each operation kind is routed
    Routes {
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Only show this operation kind
        #[arg(short, long)]
        kind: Option<String>,
    },
    /// Log every validated reload of a configuration file until Ctrl-C
    Watch {
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check { config } => {
            let config = load_config(&config)?;
            logging::init(&config.observability);
            let routing = compile_routing(&config)?;
            println!("{}", serde_json::to_string_pretty(&summary(&config, &routing))?);
        }
        Commands::Routes { config, kind } => {
            let routing = match config {
                Some(path) => {
                    let config = load_config(&path)?;
                    logging::init(&config.observability);
                    compile_routing(&config)?
                }
                None => {
                    logging::init(&ObservabilityConfig::default());
                    RoutingTable::standard()
                }
            };
            match kind {
                Some(name) => {
                    let kind: OperationKind = name.parse()?;
                    println!("{}\t{}", kind, routing.classify(kind));
                }
                None => {
                    for kind in OperationKind::ALL {
                        println!("{}\t{}", kind, routing.classify(*kind));
                    }
                }
            }
        }
        Commands::Watch { config } => watch(&config).await?,
    }

    Ok(())
}

fn compile_routing(config: &ProxyConfig) -> Result<RoutingTable, replica_proxy::config::ConfigError> {
    validate_config(config).map_err(replica_proxy::config::ConfigError::Validation)
}

fn summary(config: &ProxyConfig, routing: &RoutingTable) -> Value {
    let replicas: serde_json::Map<String, Value> = config
        .replicas
        .iter()
        .map(|(name, spec)| {
            (
                name.clone(),
                json!({ "url": spec.redacted_url(), "max_connections": spec.max_connections }),
            )
        })
        .collect();

    json!({
        "primary": {
            "url": config.primary.redacted_url(),
            "max_connections": config.primary.max_connections,
        },
        "replicas": replicas,
        "pool": {
            "acquire_timeout_ms": config.pool.acquire_timeout_ms,
            "auto_reconnect": config.pool.auto_reconnect,
            "balance": config.pool.balance,
        },
        "routing": {
            "replica_safe": routing.kinds_with(Role::ReplicaSafe).count(),
            "primary_required": routing.kinds_with(Role::PrimaryRequired).count(),
        },
    })
}

async fn watch(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(path)?;
    logging::init(&config.observability);

    tracing::info!(
        path = ?path,
        primary = %config.primary.redacted_url(),
        replicas = config.replicas.len(),
        "Watching configuration"
    );

    let (watcher, mut updates) = ConfigWatcher::new(path, config);
    let _watcher = watcher.run()?;

    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Some(config) => tracing::info!(
                    primary = %config.primary.redacted_url(),
                    replicas = ?config.replicas.keys().collect::<Vec<_>>(),
                    "Configuration reloaded"
                ),
                None => break,
            },
            result = tokio::signal::ctrl_c() => {
                result?;
                tracing::info!("Stopping watcher");
                break;
            }
        }
    }

    Ok(())
}
