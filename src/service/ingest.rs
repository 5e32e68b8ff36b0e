//! Upload path: validation, bounded streaming into a temp blob, atomic commit.

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use chrono::{DateTime, Utc};

use crate::error::FileError;
use crate::metadata::{FileRecord, RecordStatus};
use crate::retention::Retention;
use crate::service::password::hash_password;
use crate::service::{run_blocking, FileService};
use crate::storage::{new_handle, BlobStorage, BlobWriter};

/// What the uploader supplies besides the bytes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadRequest {
    pub original_name: String,
    /// Retention selector, e.g. `"1h"`
    pub retention: String,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadReceipt {
    pub id: String,
    pub original_name: String,
    pub expires_at: DateTime<Utc>,
}

/// Display names are shown to downloaders and must not carry path components.
/// They also end up in a `Content-Disposition` header, which cannot hold
/// control characters.
pub fn validate_name(name: &str) -> Result<(), FileError> {
    if name.trim().is_empty() {
        return Err(FileError::Validation("file name is empty".to_string()));
    }
    if name.contains(['/', '\\']) {
        return Err(FileError::Validation("file name must not contain path separators".to_string()));
    }
    if name.chars().any(char::is_control) {
        return Err(FileError::Validation("file name must not contain control characters".to_string()));
    }
    if name == "." || name == ".." {
        return Err(FileError::Validation("file name must not be a directory reference".to_string()));
    }
    Ok(())
}

/// Discards the temp blob on drop unless disarmed, which covers early returns
/// and a dropped upload future alike.
struct TempGuard {
    storage: Arc<dyn BlobStorage>,
    handle: String,
    armed: bool,
}

impl TempGuard {
    fn new(storage: Arc<dyn BlobStorage>, handle: &str) -> Self {
        Self {
            storage,
            handle: handle.to_string(),
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for TempGuard {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = self.storage.discard_temp(&self.handle) {
                error!("Failed to discard temp blob {}: {}", self.handle, e);
            }
        }
    }
}

/// Size and digest of a fully received upload
struct Received {
    size_bytes: u64,
    checksum: String,
}

/// Hand one block to the writer on the blocking pool and take the writer back.
async fn write_block(mut writer: Box<dyn BlobWriter>, block: Bytes) -> Result<Box<dyn BlobWriter>, FileError> {
    run_blocking("blob write", move || {
        writer.write_chunk(&block)?;
        Ok(writer)
    })
    .await
}

impl FileService {
    /// Stream `body` into storage and commit it under a fresh identifier.
    ///
    /// Name and retention are checked before any storage is touched. Exceeding
    /// `max_file_size`, a failing body, a stalled body, or `cancel` firing all
    /// remove the partial blob before the error is returned. Writes, password
    /// hashing and the commit run on the blocking pool.
    pub async fn upload<S, E>(
        self: &Arc<Self>,
        request: UploadRequest,
        mut body: S,
        cancel: &CancellationToken,
    ) -> Result<UploadReceipt, FileError>
    where
        S: Stream<Item = Result<Bytes, E>> + Unpin,
        E: Display,
    {
        validate_name(&request.original_name)?;
        let retention: Retention = request.retention.parse()?;
        let password = request.password.filter(|p| !p.is_empty());

        let mut writer = self.storage.create_temp()?;
        let guard = TempGuard::new(Arc::clone(&self.storage), writer.temp_handle());
        debug!("Receiving {} into temp blob {}", request.original_name, guard.handle);

        let limit = self.ingest.max_file_size;
        let chunk_size = self.ingest.chunk_size;
        let chunk_timeout = self.ingest.chunk_timeout();
        let mut buffer = BytesMut::with_capacity(chunk_size);
        let mut digest = md5::Context::new();
        let mut received: u64 = 0;

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => {
                    warn!("Upload of {} cancelled after {} bytes", request.original_name, received);
                    return Err(FileError::Cancelled);
                }
                next = tokio::time::timeout(chunk_timeout, body.next()) => {
                    next.map_err(|_| FileError::Timeout(chunk_timeout))?
                }
            };
            let Some(chunk) = next else { break };
            let chunk = chunk.map_err(|e| FileError::Transfer(e.to_string()))?;

            received += chunk.len() as u64;
            if received > limit {
                warn!("Upload of {} exceeded {} bytes, aborting", request.original_name, limit);
                return Err(FileError::Capacity { limit });
            }
            digest.consume(&chunk);
            buffer.extend_from_slice(&chunk);
            while buffer.len() >= chunk_size {
                let block = buffer.split_to(chunk_size).freeze();
                writer = write_block(writer, block).await?;
            }
        }
        if !buffer.is_empty() {
            writer = write_block(writer, buffer.freeze()).await?;
        }
        run_blocking("blob finish", move || writer.finish()).await?;

        let received = Received {
            size_bytes: received,
            checksum: format!("{:x}", digest.compute()),
        };

        let service = Arc::clone(self);
        let temp_handle = guard.handle.clone();
        let original_name = request.original_name;
        let receipt = run_blocking("upload commit", move || {
            let password_hash = password.as_deref().map(hash_password).transpose()?;
            service.commit(&temp_handle, &original_name, retention, &received, password_hash)
        })
        .await?;
        guard.disarm();
        Ok(receipt)
    }

    /// Insert a pending row, publish the blob, then activate the row. Each
    /// attempt uses a fresh identifier; every failure undoes what that attempt
    /// made visible.
    fn commit(
        &self,
        temp_handle: &str,
        original_name: &str,
        retention: Retention,
        received: &Received,
        password_hash: Option<String>,
    ) -> Result<UploadReceipt, FileError> {
        let attempts = self.ingest.commit_attempts;
        let mut last_error = None;

        for attempt in 1..=attempts {
            let lease = self.allocator.allocate()?;
            let uploaded_at = self.now();
            let record = FileRecord {
                id: lease.id().to_string(),
                stored_handle: new_handle(),
                original_name: original_name.to_string(),
                size_bytes: received.size_bytes,
                uploaded_at,
                expires_at: uploaded_at + retention.offset(),
                password_hash: password_hash.clone(),
                checksum: received.checksum.clone(),
                status: RecordStatus::Pending,
            };

            match self.metadata.insert(&record) {
                Ok(()) => {}
                Err(e @ FileError::DuplicateKey(_)) => {
                    warn!("Identifier {} taken at commit (attempt {}/{})", record.id, attempt, attempts);
                    last_error = Some(e);
                    continue;
                }
                Err(e) => return Err(e),
            }

            if let Err(e) = self.storage.publish(temp_handle, &record.stored_handle) {
                error!("Publishing blob for {} failed (attempt {}/{}): {}", record.id, attempt, attempts, e);
                self.rollback_row(&record.id);
                last_error = Some(e);
                continue;
            }

            if let Err(e) = self.metadata.activate(&record.id) {
                error!("Activating {} failed, rolling back: {}", record.id, e);
                if let Err(blob_err) = self.storage.delete(&record.stored_handle) {
                    error!("Rollback of blob for {} failed: {}", record.id, blob_err);
                }
                self.rollback_row(&record.id);
                return Err(match e {
                    FileError::NotFound => FileError::Storage(format!("record {} vanished before activation", record.id)),
                    other => other,
                });
            }

            info!(
                "Stored {} as {} ({} bytes, retention {}, expires {})",
                original_name, record.id, record.size_bytes, retention, record.expires_at
            );
            return Ok(UploadReceipt {
                id: record.id,
                original_name: record.original_name,
                expires_at: record.expires_at,
            });
        }

        let reason = last_error.map(|e| e.to_string()).unwrap_or_default();
        Err(FileError::Storage(format!(
            "failed to commit upload after {} attempts: {}",
            attempts, reason
        )))
    }

    fn rollback_row(&self, id: &str) {
        match self.metadata.delete(id) {
            Ok(()) | Err(FileError::NotFound) => {}
            Err(e) => error!("Rollback of record {} failed: {}", id, e),
        }
    }
}
