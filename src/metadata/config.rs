//! Configuration for metadata storage backends

use crate::config::MetadataConfig;
use crate::error::FileError;
use crate::metadata::{mock_store::MockMetadataStore, sqlite_store::SQLiteMetadataStore, MetadataStorage};
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Available metadata storage backends
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum MetadataBackend {
    #[default]
    SQLite,
    Mock,
}

impl std::str::FromStr for MetadataBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlite" => Ok(MetadataBackend::SQLite),
            "mock" | "memory" => Ok(MetadataBackend::Mock),
            _ => Err(format!("Unknown metadata backend: {}", s)),
        }
    }
}

/// Create a metadata storage instance based on the configuration
pub fn create_store(config: &MetadataConfig) -> Result<Arc<dyn MetadataStorage>, FileError> {
    match config.backend {
        MetadataBackend::SQLite => {
            info!(
                "Creating SQLite metadata store at {} (readers: {}, wal: {})",
                config.db_path, config.pool_size, config.wal_mode
            );
            Ok(Arc::new(SQLiteMetadataStore::open(config)?))
        }
        MetadataBackend::Mock => {
            info!("Creating in-memory metadata store");
            Ok(Arc::new(MockMetadataStore::new()))
        }
    }
}
