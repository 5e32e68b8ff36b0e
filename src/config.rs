//! Application Configuration
//!
//! This module provides configuration management for the application,
//! supporting YAML configuration files with sensible defaults.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub use crate::metadata::config::MetadataBackend;
pub use crate::storage::config::StorageBackend;

/// 1.5 GiB
pub const MAX_FILE_SIZE: u64 = 1536 * 1024 * 1024;

/// Default ingest write size (1 MiB)
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Environment variable naming an alternative config file
pub const CONFIG_PATH_ENV: &str = "FILE_DROP_CONFIG";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Blob storage configuration
    pub storage: StorageConfig,
    /// Metadata configuration
    pub metadata: MetadataConfig,
    /// Upload limits and commit policy
    pub ingest: IngestConfig,
    /// Identifier allocation
    pub identifiers: IdentifierConfig,
    /// Expiry sweeper configuration
    pub sweeper: SweeperConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Number of worker threads
    pub workers: usize,
    /// Maximum payload size in bytes
    pub max_payload_size: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            workers: 4,
            max_payload_size: MAX_FILE_SIZE + DEFAULT_CHUNK_SIZE as u64,
        }
    }
}

/// Blob storage backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Directory holding published blobs
    pub base_path: String,
    /// Directory holding in-flight uploads; must be on the same filesystem as `base_path`
    pub temp_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::LocalFs,
            base_path: "./data/uploads".to_string(),
            temp_path: "./data/uploads/.tmp".to_string(),
        }
    }
}

/// Metadata backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    pub backend: MetadataBackend,
    /// Database file path
    pub db_path: String,
    /// Number of reader connections
    pub pool_size: u32,
    /// Enable WAL mode
    pub wal_mode: bool,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            backend: MetadataBackend::SQLite,
            db_path: "./data/files.db".to_string(),
            pool_size: 4,
            wal_mode: true,
        }
    }
}

/// Upload limits and commit policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub max_file_size: u64,
    pub chunk_size: usize,
    /// Longest wait for the next chunk of an upload
    pub chunk_timeout_secs: u64,
    /// Longest wait for a single blob read during download
    pub read_timeout_secs: u64,
    /// Commit attempts (each with a fresh identifier) before giving up
    pub commit_attempts: u32,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_file_size: MAX_FILE_SIZE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_timeout_secs: 60,
            read_timeout_secs: 60,
            commit_attempts: 3,
        }
    }
}

impl IngestConfig {
    pub fn chunk_timeout(&self) -> Duration {
        Duration::from_secs(self.chunk_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

/// Identifier allocation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentifierConfig {
    /// Starting identifier length
    pub length: usize,
    /// Longest identifier the allocator escalates to
    pub max_length: usize,
    /// Candidates tried at one length before growing it
    pub attempts_per_length: u32,
}

impl Default for IdentifierConfig {
    fn default() -> Self {
        Self {
            length: 6,
            max_length: 8,
            attempts_per_length: 10,
        }
    }
}

/// Expiry sweeper configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweeperConfig {
    /// Enable the background sweeper
    pub enabled: bool,
    /// Sweep interval in seconds
    pub interval_secs: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 60,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Path to log4rs configuration file
    pub config_file: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            config_file: "server_log.yaml".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `$FILE_DROP_CONFIG` or `config.yaml`, use defaults if not found
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let config_path = env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "config.yaml".to_string());
        let mut config = if Path::new(&config_path).exists() {
            let content = fs::read_to_string(&config_path)?;
            let config: AppConfig = serde_yaml::from_str(&content)?;
            info!("Loaded configuration from {}", config_path);
            config
        } else {
            warn!("Config file {} not found, using defaults", config_path);
            Self::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(content: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let config: AppConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Backend selection from `STORAGE_BACKEND` / `METADATA_BACKEND`
    pub fn apply_env_overrides(&mut self) {
        if let Ok(value) = env::var("STORAGE_BACKEND") {
            match value.parse::<StorageBackend>() {
                Ok(backend) => {
                    info!("Using storage backend from environment: {:?}", backend);
                    self.storage.backend = backend;
                }
                Err(e) => warn!("Invalid storage backend in environment: {}. Keeping {:?}.", e, self.storage.backend),
            }
        }
        if let Ok(value) = env::var("METADATA_BACKEND") {
            match value.parse::<MetadataBackend>() {
                Ok(backend) => {
                    info!("Using metadata backend from environment: {:?}", backend);
                    self.metadata.backend = backend;
                }
                Err(e) => warn!("Invalid metadata backend in environment: {}. Keeping {:?}.", e, self.metadata.backend),
            }
        }
    }

    fn validate(&self) -> Result<(), String> {
        if self.identifiers.length == 0 || self.identifiers.max_length < self.identifiers.length {
            return Err(format!(
                "identifiers: length {} and max_length {} must satisfy 0 < length <= max_length",
                self.identifiers.length, self.identifiers.max_length
            ));
        }
        if self.ingest.chunk_size == 0 {
            return Err("ingest.chunk_size must be positive".to_string());
        }
        if self.ingest.commit_attempts == 0 || self.identifiers.attempts_per_length == 0 {
            return Err("attempt counts must be positive".to_string());
        }
        Ok(())
    }
}
