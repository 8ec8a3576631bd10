//! Configuration loading for search-sync.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at ~/.config/search-sync/config.toml.

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::TypesError;

/// Which search engine client the daemon talks to.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// Embedded Tantivy index (default)
    #[default]
    Tantivy,
    /// Remote Elasticsearch cluster over HTTP
    Elasticsearch,
}

/// Search engine connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    #[serde(default)]
    pub kind: EngineKind,

    /// Base URL of the Elasticsearch cluster
    #[serde(default = "default_engine_url")]
    pub url: String,

    /// Directory of the embedded Tantivy index
    #[serde(default = "default_index_path")]
    pub index_path: String,

    /// Tantivy writer memory budget in MB
    #[serde(default = "default_writer_memory_mb")]
    pub writer_memory_mb: usize,
}

fn default_engine_url() -> String {
    "http://localhost:9200".to_string()
}

fn default_index_path() -> String {
    ProjectDirs::from("", "", "search-sync")
        .map(|p| p.data_local_dir().join("index"))
        .unwrap_or_else(|| PathBuf::from("./index"))
        .to_string_lossy()
        .to_string()
}

fn default_writer_memory_mb() -> usize {
    50
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            kind: EngineKind::default(),
            url: default_engine_url(),
            index_path: default_index_path(),
            writer_memory_mb: default_writer_memory_mb(),
        }
    }
}

/// Queue draining and retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Number of concurrent drain workers
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Pause between drain cycles when the queue is empty
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Upper bound for awaiting one bulk acknowledgment
    #[serde(default = "default_bulk_timeout_secs")]
    pub bulk_timeout_secs: u64,

    /// Delivery attempts before a batch escalates to an alert
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First backoff delay after a transient failure
    #[serde(default = "default_backoff_initial_ms")]
    pub backoff_initial_ms: u64,

    /// Total time spent retrying one batch in place
    #[serde(default = "default_backoff_max_elapsed_secs")]
    pub backoff_max_elapsed_secs: u64,
}

fn default_workers() -> usize {
    1
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_bulk_timeout_secs() -> u64 {
    10
}

fn default_max_attempts() -> u32 {
    5
}

fn default_backoff_initial_ms() -> u64 {
    500
}

fn default_backoff_max_elapsed_secs() -> u64 {
    30
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            poll_interval_ms: default_poll_interval_ms(),
            bulk_timeout_secs: default_bulk_timeout_secs(),
            max_attempts: default_max_attempts(),
            backoff_initial_ms: default_backoff_initial_ms(),
            backoff_max_elapsed_secs: default_backoff_max_elapsed_secs(),
        }
    }
}

impl SyncSettings {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.workers == 0 {
            return Err("workers must be > 0".to_string());
        }
        if self.bulk_timeout_secs == 0 {
            return Err("bulk_timeout_secs must be > 0".to_string());
        }
        if self.max_attempts == 0 {
            return Err("max_attempts must be > 0".to_string());
        }
        Ok(())
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Path to the RocksDB queue directory
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub engine: EngineSettings,

    #[serde(default)]
    pub sync: SyncSettings,
}

fn default_db_path() -> String {
    ProjectDirs::from("", "", "search-sync")
        .map(|p| p.data_local_dir().join("queue"))
        .unwrap_or_else(|| PathBuf::from("./queue"))
        .to_string_lossy()
        .to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            log_level: default_log_level(),
            engine: EngineSettings::default(),
            sync: SyncSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/search-sync/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (SEARCH_SYNC__*)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, TypesError> {
        let config_dir = ProjectDirs::from("", "", "search-sync")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("db_path", default_db_path())
            .map_err(|e| TypesError::Config(e.to_string()))?
            .set_default("log_level", default_log_level())
            .map_err(|e| TypesError::Config(e.to_string()))?
            .set_default("engine.url", default_engine_url())
            .map_err(|e| TypesError::Config(e.to_string()))?
            .set_default("engine.index_path", default_index_path())
            .map_err(|e| TypesError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Format: SEARCH_SYNC__DB_PATH, SEARCH_SYNC__SYNC__MAX_ATTEMPTS, etc.
        builder = builder.add_source(
            Environment::with_prefix("SEARCH_SYNC")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| TypesError::Config(e.to_string()))?;

        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| TypesError::Config(e.to_string()))?;
        settings.sync.validate().map_err(TypesError::Config)?;
        Ok(settings)
    }

    /// Expand ~ in db_path to the home directory
    pub fn expanded_db_path(&self) -> PathBuf {
        expand_home(&self.db_path)
    }

    /// Expand ~ in the Tantivy index path to the home directory
    pub fn expanded_index_path(&self) -> PathBuf {
        expand_home(&self.engine.index_path)
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
