//! Configuration for blob storage backends

use crate::config::StorageConfig;
use crate::error::FileError;
use crate::storage::{local_store::LocalFsBlobStore, mock_store::MockBlobStore, BlobStorage};
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Available blob storage backends
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum StorageBackend {
    #[default]
    LocalFs,
    Mock,
}

impl std::str::FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "localfs" | "local" | "fs" => Ok(StorageBackend::LocalFs),
            "mock" | "memory" => Ok(StorageBackend::Mock),
            _ => Err(format!("Unknown storage backend: {}", s)),
        }
    }
}

/// Create a storage instance based on the configuration
pub fn create_store(config: &StorageConfig) -> Result<Arc<dyn BlobStorage>, FileError> {
    match config.backend {
        StorageBackend::LocalFs => Ok(Arc::new(LocalFsBlobStore::new(config)?)),
        StorageBackend::Mock => {
            info!("Using in-memory blob storage");
            Ok(Arc::new(MockBlobStore::new()))
        }
    }
}
