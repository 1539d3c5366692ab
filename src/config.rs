//! Configuration loading and types for FileProvider.
//!
//! Configuration is read from a YAML file and deserialized into the
//! [`Config`] struct.  Each subsection governs a different part of the
//! system: networking, upload validation, metadata persistence, object
//! storage, logging, and observability.

use serde::Deserialize;
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Upload validation rules.
    #[serde(default)]
    pub upload: UploadConfig,

    /// Metadata store settings.
    #[serde(default)]
    pub metadata: MetadataConfig,

    /// Object storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Observability settings (metrics + health probe).
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Reject combinations that would make the upload endpoint misbehave.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.upload.max_file_size == 0 {
            anyhow::bail!("upload.max_file_size must be greater than zero");
        }
        // The request limit has to leave room for the file itself plus the
        // multipart framing, otherwise oversized files are cut off by axum
        // before the handler can answer with its own message.
        if self.server.max_request_size as u64 <= self.upload.max_file_size {
            anyhow::bail!(
                "server.max_request_size ({}) must exceed upload.max_file_size ({})",
                self.server.max_request_size,
                self.upload.max_file_size
            );
        }
        Ok(())
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind host address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,

    /// Maximum accepted request body in bytes (default 8 MiB).
    #[serde(default = "default_max_request_size")]
    pub max_request_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_timeout: default_shutdown_timeout(),
            max_request_size: default_max_request_size(),
        }
    }
}

/// Validation rules applied to every upload.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    /// Largest accepted file in bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Lower-case extensions including the leading dot.
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,

    /// Container used when the request does not name one.
    #[serde(default = "default_container")]
    pub default_container: String,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            allowed_extensions: default_allowed_extensions(),
            default_container: default_container(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Observability settings.
///
/// Controls Prometheus metrics collection and the health probe.
/// Both are enabled by default.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Enable Prometheus metrics collection and `/metrics` endpoint.
    #[serde(default = "default_true")]
    pub metrics: bool,

    /// Enable the `/health` probe.
    #[serde(default = "default_true")]
    pub health_check: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics: true,
            health_check: true,
        }
    }
}

/// Metadata store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetadataConfig {
    /// Backend type: `sqlite` or `memory`.
    #[serde(default = "default_metadata_engine")]
    pub engine: String,

    /// SQLite-specific configuration.
    #[serde(default)]
    pub sqlite: SqliteConfig,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            engine: default_metadata_engine(),
            sqlite: SqliteConfig::default(),
        }
    }
}

/// SQLite-specific metadata configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_metadata_path")]
    pub path: String,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: default_metadata_path(),
        }
    }
}

/// Object storage backend configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Backend type: `local`, `memory`, `azure`.
    #[serde(default = "default_storage_backend")]
    pub backend: String,

    /// Local storage configuration.
    #[serde(default)]
    pub local: LocalStorageConfig,

    /// Memory storage configuration.
    #[serde(default)]
    pub memory: MemoryStorageConfig,

    /// Azure Blob Storage configuration.
    #[serde(default)]
    pub azure: Option<AzureStorageConfig>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            local: LocalStorageConfig::default(),
            memory: MemoryStorageConfig::default(),
            azure: None,
        }
    }
}

/// Local filesystem storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LocalStorageConfig {
    /// Root directory; each container is a subdirectory.
    #[serde(default = "default_storage_root")]
    pub root_dir: String,
}

impl Default for LocalStorageConfig {
    fn default() -> Self {
        Self {
            root_dir: default_storage_root(),
        }
    }
}

/// Memory storage backend configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MemoryStorageConfig {
    /// Base URL that object addresses are built on.
    #[serde(default = "default_memory_base_url")]
    pub base_url: String,
}

impl Default for MemoryStorageConfig {
    fn default() -> Self {
        Self {
            base_url: default_memory_base_url(),
        }
    }
}

/// Azure Blob Storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AzureStorageConfig {
    /// Azure storage account name.
    pub account: String,
    /// Override for the blob service endpoint (e.g. Azurite).
    #[serde(default)]
    pub endpoint: String,
    /// Prefix prepended to every blob name.
    #[serde(default)]
    pub prefix: String,
}

// -- Defaults ----------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    7071
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_max_request_size() -> usize {
    8 * 1024 * 1024
}

fn default_max_file_size() -> u64 {
    2500 * 1500
}

fn default_allowed_extensions() -> Vec<String> {
    [".jpg", ".jpeg", ".svg", ".png"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_container() -> String {
    "files".to_string()
}

fn default_metadata_engine() -> String {
    "sqlite".to_string()
}

fn default_metadata_path() -> String {
    "./data/metadata.db".to_string()
}

fn default_storage_backend() -> String {
    "local".to_string()
}

fn default_storage_root() -> String {
    "./data/blobs".to_string()
}

fn default_memory_base_url() -> String {
    "http://localhost:7071/blobs".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Loader ------------------------------------------------------------------

/// Load, parse and validate configuration from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let config: Config = serde_yaml::from_str(&contents)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_upload_rules() {
        let config = Config::default();
        assert_eq!(config.upload.max_file_size, 3_750_000);
        assert_eq!(config.upload.default_container, "files");
        assert_eq!(
            config.upload.allowed_extensions,
            vec![".jpg", ".jpeg", ".svg", ".png"]
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = r#"
server:
  port: 8080
storage:
  backend: memory
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.storage.backend, "memory");
        assert_eq!(config.storage.memory.base_url, "http://localhost:7071/blobs");
        assert_eq!(config.metadata.engine, "sqlite");
        assert!(config.observability.metrics);
    }

    #[test]
    fn test_azure_section() {
        let yaml = r#"
storage:
  backend: azure
  azure:
    account: myaccount
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let azure = config.storage.azure.unwrap();
        assert_eq!(azure.account, "myaccount");
        assert_eq!(azure.endpoint, "");
        assert_eq!(azure.prefix, "");
    }

    #[test]
    fn test_validate_rejects_small_request_limit() {
        let mut config = Config::default();
        config.server.max_request_size = 1024;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_file_size() {
        let mut config = Config::default();
        config.upload.max_file_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fileprovider.yaml");
        std::fs::write(
            &path,
            "upload:\n  default_container: images\nlogging:\n  format: json\n",
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.upload.default_container, "images");
        assert_eq!(config.logging.format, "json");
    }
}
