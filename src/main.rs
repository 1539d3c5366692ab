//! FileProvider -- image upload service.
//!
//! Loads configuration, wires the metadata store and object storage
//! backend, and serves the upload API until SIGTERM/SIGINT.

use std::future::IntoFuture;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

use fileprovider::config::{Config, LoggingConfig};
use fileprovider::metadata::store::MetadataStore;
use fileprovider::storage::backend::StorageBackend;

/// Command-line arguments for the FileProvider server.
#[derive(Parser, Debug)]
#[command(name = "fileprovider", version, about = "Image upload service")]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "fileprovider.example.yaml")]
    config: String,

    /// Override the bind address (host:port).
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = fileprovider::config::load_config(&cli.config)?;
    init_tracing(&config.logging);
    info!("Loaded configuration from {}", cli.config);

    let bind_addr = cli
        .bind
        .unwrap_or_else(|| format!("{}:{}", config.server.host, config.server.port));

    if config.observability.metrics {
        let handle = fileprovider::metrics::init_metrics();
        fileprovider::metrics::describe_metrics();
        fileprovider::metrics::spawn_upkeep(handle, Duration::from_secs(5));
        info!("Prometheus metrics initialized");
    }

    let metadata = build_metadata_store(&config)?;
    let storage = build_storage_backend(&config)?;

    let state = Arc::new(fileprovider::AppState::new(config.clone(), storage, metadata));
    let app = fileprovider::server::app(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("FileProvider listening on {}", bind_addr);

    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout);
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .into_future();

    // In-flight requests get `shutdown_timeout` to finish once the signal fires.
    tokio::select! {
        result = server => result?,
        _ = async {
            shutdown_signal().await;
            tokio::time::sleep(shutdown_timeout).await;
        } => {
            warn!("Graceful shutdown timed out after {:?}", shutdown_timeout);
        }
    }

    info!("FileProvider shut down");
    Ok(())
}

/// Install the global tracing subscriber.  `RUST_LOG` overrides the
/// configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn build_metadata_store(config: &Config) -> anyhow::Result<Arc<dyn MetadataStore>> {
    match config.metadata.engine.as_str() {
        "memory" => {
            info!("In-memory metadata store initialized");
            Ok(Arc::new(
                fileprovider::metadata::memory::MemoryMetadataStore::new(),
            ))
        }
        "sqlite" => {
            let path = &config.metadata.sqlite.path;
            if let Some(parent) = Path::new(path).parent() {
                std::fs::create_dir_all(parent)?;
            }
            let store = fileprovider::metadata::sqlite::SqliteMetadataStore::new(path)?;
            info!("SQLite metadata store initialized at {}", path);
            Ok(Arc::new(store))
        }
        other => anyhow::bail!("unknown metadata.engine '{}'", other),
    }
}

fn build_storage_backend(config: &Config) -> anyhow::Result<Arc<dyn StorageBackend>> {
    match config.storage.backend.as_str() {
        "azure" => {
            let azure = config.storage.azure.as_ref().ok_or_else(|| {
                anyhow::anyhow!(
                    "storage.backend is 'azure' but storage.azure config section is missing"
                )
            })?;
            let backend = fileprovider::storage::azure::AzureBlobBackend::new(
                azure.account.clone(),
                azure.endpoint.clone(),
                azure.prefix.clone(),
            )?;
            Ok(Arc::new(backend))
        }
        "memory" => {
            let base_url = &config.storage.memory.base_url;
            let backend = fileprovider::storage::memory::MemoryBackend::new(base_url)?;
            info!("Memory storage backend initialized at {}", base_url);
            Ok(Arc::new(backend))
        }
        "local" => {
            let root = &config.storage.local.root_dir;
            let backend = fileprovider::storage::local::LocalBackend::new(root)?;
            info!("Local storage backend initialized at {}", root);
            Ok(Arc::new(backend))
        }
        other => anyhow::bail!("unknown storage.backend '{}'", other),
    }
}

/// Wait for SIGTERM or SIGINT (Ctrl+C), then return to trigger graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT, shutting down");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        },
    }
}
