//! Binary Storage Layer Abstraction
//!
//! This module provides an abstraction over blob storage backends, allowing
//! the lifecycle service to use different implementations (local files,
//! in-memory) without affecting higher-level code.
//!
//! Blobs are written into a temp area that readers never look at, then made
//! reachable under their final handle with a single `publish` step.

pub mod local_store;
pub mod mock_store;
pub mod config;


use tokio::io::AsyncRead;

use crate::error::FileError;

/// Readable blob content
pub type BlobReader = Box<dyn AsyncRead + Send + Unpin>;

/// Sink for an upload that is not yet visible to readers
pub trait BlobWriter: Send {
    /// Name of the temp blob being written
    fn temp_handle(&self) -> &str;

    /// Append a chunk to the temp blob
    fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), FileError>;

    /// Flush everything written so far to durable storage
    fn finish(&mut self) -> Result<(), FileError>;
}

/// Trait defining the blob storage interface
pub trait BlobStorage: Send + Sync {
    /// Start a new temp blob
    fn create_temp(&self) -> Result<Box<dyn BlobWriter>, FileError>;

    /// Remove a temp blob; a missing one is not an error
    fn discard_temp(&self, temp_handle: &str) -> Result<(), FileError>;

    /// Atomically move a finished temp blob to its final handle
    fn publish(&self, temp_handle: &str, stored_handle: &str) -> Result<(), FileError>;

    /// Open a published blob; `NotFound` if it is gone
    fn open(&self, stored_handle: &str) -> Result<BlobReader, FileError>;

    /// Remove a published blob. Returns `false` if it was already gone.
    fn delete(&self, stored_handle: &str) -> Result<bool, FileError>;

    fn exists(&self, stored_handle: &str) -> Result<bool, FileError>;

    /// Handles of all published blobs
    fn list_blobs(&self) -> Result<Vec<String>, FileError>;

    /// Handles of all temp blobs
    fn list_temp(&self) -> Result<Vec<String>, FileError>;

    /// Remove every temp blob, returning how many were removed
    fn purge_temp(&self) -> Result<usize, FileError>;
}

/// Fresh random blob handle (128 bits, hex)
pub fn new_handle() -> String {
    hex::encode(rand::random::<[u8; 16]>())
}

/// Handles are generated internally; anything else is refused before it reaches a path.
pub fn validate_handle(handle: &str) -> Result<(), FileError> {
    if handle.is_empty() || !handle.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(FileError::Storage("invalid blob handle".to_string()));
    }
    Ok(())
}
