//! Mock implementation of BlobStorage for testing

use crate::error::FileError;
use crate::storage::{new_handle, BlobReader, BlobStorage, BlobWriter};
use log::info;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

type BlobMap = Arc<Mutex<HashMap<String, Vec<u8>>>>;

fn lock(map: &BlobMap) -> Result<MutexGuard<'_, HashMap<String, Vec<u8>>>, FileError> {
    map.lock()
        .map_err(|_| FileError::Storage("blob map lock poisoned".to_string()))
}

/// In-memory blob storage with failure injection for rollback tests
pub struct MockBlobStore {
    blobs: BlobMap,
    temp: BlobMap,
    failing_publishes: AtomicUsize,
}

impl MockBlobStore {
    pub fn new() -> Self {
        Self {
            blobs: Arc::new(Mutex::new(HashMap::new())),
            temp: Arc::new(Mutex::new(HashMap::new())),
            failing_publishes: AtomicUsize::new(0),
        }
    }

    /// Make the next `count` publishes fail
    pub fn fail_next_publishes(&self, count: usize) {
        self.failing_publishes.store(count, Ordering::SeqCst);
    }

    pub fn blob_count(&self) -> usize {
        self.blobs.lock().map(|blobs| blobs.len()).unwrap_or(0)
    }

    pub fn temp_count(&self) -> usize {
        self.temp.lock().map(|temp| temp.len()).unwrap_or(0)
    }

    /// Clear all data from the store
    pub fn clear(&self) {
        if let Ok(mut blobs) = self.blobs.lock() {
            blobs.clear();
        }
        if let Ok(mut temp) = self.temp.lock() {
            temp.clear();
        }
    }
}

impl Default for MockBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

pub struct MockBlobWriter {
    handle: String,
    temp: BlobMap,
}

impl BlobWriter for MockBlobWriter {
    fn temp_handle(&self) -> &str {
        &self.handle
    }

    fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), FileError> {
        let mut temp = lock(&self.temp)?;
        let data = temp
            .get_mut(&self.handle)
            .ok_or_else(|| FileError::Storage("temp blob vanished".to_string()))?;
        data.extend_from_slice(chunk);
        Ok(())
    }

    fn finish(&mut self) -> Result<(), FileError> {
        Ok(())
    }
}

impl BlobStorage for MockBlobStore {
    fn create_temp(&self) -> Result<Box<dyn BlobWriter>, FileError> {
        let handle = new_handle();
        lock(&self.temp)?.insert(handle.clone(), Vec::new());
        Ok(Box::new(MockBlobWriter {
            handle,
            temp: Arc::clone(&self.temp),
        }))
    }

    fn discard_temp(&self, temp_handle: &str) -> Result<(), FileError> {
        lock(&self.temp)?.remove(temp_handle);
        Ok(())
    }

    fn publish(&self, temp_handle: &str, stored_handle: &str) -> Result<(), FileError> {
        let injected = self
            .failing_publishes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(FileError::Storage("injected publish failure".to_string()));
        }

        let mut blobs = lock(&self.blobs)?;
        if blobs.contains_key(stored_handle) {
            return Err(FileError::Storage("blob handle already in use".to_string()));
        }
        let data = lock(&self.temp)?
            .remove(temp_handle)
            .ok_or_else(|| FileError::Storage("temp blob missing".to_string()))?;
        info!("Mock: published {} bytes as {}", data.len(), stored_handle);
        blobs.insert(stored_handle.to_string(), data);
        Ok(())
    }

    fn open(&self, stored_handle: &str) -> Result<BlobReader, FileError> {
        let data = lock(&self.blobs)?
            .get(stored_handle)
            .cloned()
            .ok_or(FileError::NotFound)?;
        Ok(Box::new(Cursor::new(data)))
    }

    fn delete(&self, stored_handle: &str) -> Result<bool, FileError> {
        Ok(lock(&self.blobs)?.remove(stored_handle).is_some())
    }

    fn exists(&self, stored_handle: &str) -> Result<bool, FileError> {
        Ok(lock(&self.blobs)?.contains_key(stored_handle))
    }

    fn list_blobs(&self) -> Result<Vec<String>, FileError> {
        Ok(lock(&self.blobs)?.keys().cloned().collect())
    }

    fn list_temp(&self) -> Result<Vec<String>, FileError> {
        Ok(lock(&self.temp)?.keys().cloned().collect())
    }

    fn purge_temp(&self) -> Result<usize, FileError> {
        let mut temp = lock(&self.temp)?;
        let count = temp.len();
        temp.clear();
        Ok(count)
    }
}
