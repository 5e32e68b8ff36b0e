//! File lifecycle service.
//!
//! `FileService` owns the blob store, the metadata store, the identifier
//! allocator and the clock. Upload lives in `ingest`, download in `retrieval`,
//! expiry collection in `expiry_worker`; listing, explicit delete and startup
//! reconciliation are here.

pub mod expiry_worker;
pub mod id_allocator;
pub mod ingest;
pub mod password;
pub mod retrieval;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use std::sync::{Arc, Mutex};

use crate::clock::Clock;
use crate::config::{IdentifierConfig, IngestConfig};
use crate::error::FileError;
use crate::metadata::{FileRecord, FileSummary, MetadataStorage};
use crate::service::id_allocator::IdAllocator;
use crate::storage::BlobStorage;

pub use crate::service::ingest::{UploadReceipt, UploadRequest};
pub use crate::service::retrieval::{ByteStream, Download};

/// Run synchronous file, database or hashing work on the blocking pool.
pub(crate) async fn run_blocking<T, F>(task: &'static str, work: F) -> Result<T, FileError>
where
    F: FnOnce() -> Result<T, FileError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(|e| {
        error!("Blocking task {} failed to complete: {}", task, e);
        FileError::Storage(format!("{} task failed: {}", task, e))
    })?
}

pub struct FileService {
    storage: Arc<dyn BlobStorage>,
    metadata: Arc<dyn MetadataStorage>,
    allocator: IdAllocator,
    clock: Arc<dyn Clock>,
    ingest: IngestConfig,
    sweep_guard: Mutex<()>,
}

impl FileService {
    /// Create a new file service with injected backends
    pub fn new(
        storage: Arc<dyn BlobStorage>,
        metadata: Arc<dyn MetadataStorage>,
        clock: Arc<dyn Clock>,
        ingest: IngestConfig,
        identifiers: IdentifierConfig,
    ) -> Self {
        let allocator = IdAllocator::new(Arc::clone(&metadata), identifiers);
        Self {
            storage,
            metadata,
            allocator,
            clock,
            ingest,
            sweep_guard: Mutex::new(()),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn ingest_config(&self) -> &IngestConfig {
        &self.ingest
    }

    /// Files that can currently be downloaded, newest first
    pub fn list_all(&self) -> Result<Vec<FileSummary>, FileError> {
        let now = self.now();
        Ok(self
            .metadata
            .list_all()?
            .iter()
            .filter(|record| record.is_visible(now))
            .map(FileRecord::summary)
            .collect())
    }

    /// Remove an active file ahead of its expiry.
    ///
    /// Expired and pending records answer `NotFound` and are left to the sweeper.
    pub fn delete(&self, id: &str) -> Result<(), FileError> {
        let record = self.metadata.get(id)?;
        if !record.is_visible(self.now()) {
            return Err(FileError::NotFound);
        }
        if !self.remove_record(&record)? {
            return Err(FileError::NotFound);
        }
        info!("Deleted file {} ({} bytes)", record.id, record.size_bytes);
        Ok(())
    }

    /// Blob first, then metadata. Returns `false` when the row was already gone.
    pub(crate) fn remove_record(&self, record: &FileRecord) -> Result<bool, FileError> {
        if !self.storage.delete(&record.stored_handle)? {
            debug!("Blob for {} was already removed", record.id);
        }
        match self.metadata.delete(&record.id) {
            Ok(()) => Ok(true),
            Err(FileError::NotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Startup clean-up: drop leftover temp blobs and published blobs no record
    /// points at. Must not run while uploads are in flight.
    pub fn reconcile(&self) -> Result<usize, FileError> {
        let purged = self.storage.purge_temp()?;
        let referenced = self.metadata.stored_handles()?;
        let mut orphans = 0;
        for handle in self.storage.list_blobs()? {
            if !referenced.contains(&handle) && self.storage.delete(&handle)? {
                warn!("Removed orphan blob {}", handle);
                orphans += 1;
            }
        }
        info!("Reconciled storage: {} temp blobs purged, {} orphan blobs removed", purged, orphans);
        Ok(purged + orphans)
    }
}
