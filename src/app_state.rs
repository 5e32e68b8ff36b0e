//! Application State Management
//!
//! This module provides the application state that holds the file service and
//! its dependencies, following the dependency injection pattern.

use std::sync::Arc;
use log::info;
use tokio_util::sync::CancellationToken;

use crate::clock::{Clock, SystemClock};
use crate::config::AppConfig;
use crate::error::FileError;
use crate::metadata::{self, mock_store::MockMetadataStore, MetadataStorage};
use crate::service::expiry_worker::ExpiryWorker;
use crate::service::FileService;
use crate::storage::{self, mock_store::MockBlobStore, BlobStorage};

/// Application state containing the service and its configuration
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<FileService>,
    pub config: AppConfig,
    /// Cancelled on shutdown; in-flight transfers and the expiry worker watch it
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Create application state from configuration
    pub fn from_config(config: AppConfig) -> Result<Self, FileError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Same as `from_config` with an explicit clock
    pub fn with_clock(config: AppConfig, clock: Arc<dyn Clock>) -> Result<Self, FileError> {
        info!("Initializing application state with configuration");

        let storage_backend = storage::config::create_store(&config.storage)?;
        let metadata_backend = metadata::config::create_store(&config.metadata)?;

        let state = Self::assemble(config, storage_backend, metadata_backend, clock);
        info!("Application state initialized successfully");
        Ok(state)
    }

    /// Create application state for testing with mock backends
    pub fn new_for_testing() -> Self {
        Self::assemble(
            AppConfig::default(),
            Arc::new(MockBlobStore::new()),
            Arc::new(MockMetadataStore::new()),
            Arc::new(SystemClock),
        )
    }

    /// Wire explicit backends together
    pub fn assemble(
        config: AppConfig,
        storage_backend: Arc<dyn BlobStorage>,
        metadata_backend: Arc<dyn MetadataStorage>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let service = Arc::new(FileService::new(
            storage_backend,
            metadata_backend,
            clock,
            config.ingest.clone(),
            config.identifiers.clone(),
        ));
        Self {
            service,
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Start the expiry worker if enabled. It stops with `shutdown`.
    pub fn start_expiry_worker(&self) -> Option<tokio::task::JoinHandle<()>> {
        if !self.config.sweeper.enabled {
            info!("Expiry worker disabled by configuration");
            return None;
        }
        let worker = ExpiryWorker::from_config(Arc::clone(&self.service), &self.config.sweeper);
        Some(worker.start_background(self.shutdown.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MetadataBackend, StorageBackend};

    #[test]
    fn test_from_config_with_mock_backends() {
        let mut config = AppConfig::default();
        config.storage.backend = StorageBackend::Mock;
        config.metadata.backend = MetadataBackend::Mock;
        let state = AppState::from_config(config).unwrap();
        assert!(state.service.list_all().unwrap().is_empty());
        assert!(!state.shutdown.is_cancelled());
    }

    #[test]
    fn test_from_config_with_local_backends() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.storage.base_path = dir.path().join("uploads").to_string_lossy().into_owned();
        config.storage.temp_path = dir.path().join("uploads").join(".tmp").to_string_lossy().into_owned();
        config.metadata.db_path = dir.path().join("files.db").to_string_lossy().into_owned();

        let state = AppState::from_config(config).unwrap();
        assert_eq!(state.service.reconcile().unwrap(), 0);
        assert!(dir.path().join("files.db").exists());
    }

    #[tokio::test]
    async fn test_disabled_worker_is_not_started() {
        let mut state = AppState::new_for_testing();
        state.config.sweeper.enabled = false;
        assert!(state.start_expiry_worker().is_none());
    }

    #[tokio::test]
    async fn test_worker_stops_with_shutdown() {
        let state = AppState::new_for_testing();
        let handle = state.start_expiry_worker().unwrap();
        state.shutdown.cancel();
        handle.await.unwrap();
    }
}
