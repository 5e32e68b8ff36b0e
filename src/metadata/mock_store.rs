//! In-memory implementation of MetadataStorage trait for testing

use crate::error::FileError;
use crate::metadata::{FileRecord, MetadataStorage, RecordStatus};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// In-memory implementation of MetadataStorage
pub struct MockMetadataStore {
    records: RwLock<HashMap<String, FileRecord>>,
}

impl MockMetadataStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Clear all data from the store (useful for test cleanup)
    pub fn clear(&self) {
        if let Ok(mut records) = self.records.write() {
            records.clear();
        }
    }

    /// Number of records, whatever their state
    pub fn record_count(&self) -> usize {
        self.records.read().map(|records| records.len()).unwrap_or(0)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, FileRecord>>, FileError> {
        self.records
            .read()
            .map_err(|_| FileError::Storage("metadata lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, FileRecord>>, FileError> {
        self.records
            .write()
            .map_err(|_| FileError::Storage("metadata lock poisoned".to_string()))
    }
}

impl Default for MockMetadataStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataStorage for MockMetadataStore {
    fn insert(&self, record: &FileRecord) -> Result<(), FileError> {
        let mut records = self.write()?;
        if records.contains_key(&record.id) {
            return Err(FileError::DuplicateKey(record.id.clone()));
        }
        records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn get(&self, id: &str) -> Result<FileRecord, FileError> {
        self.read()?.get(id).cloned().ok_or(FileError::NotFound)
    }

    fn delete(&self, id: &str) -> Result<(), FileError> {
        self.write()?.remove(id).map(|_| ()).ok_or(FileError::NotFound)
    }

    fn list_expired(&self, as_of: DateTime<Utc>) -> Result<Vec<FileRecord>, FileError> {
        let mut expired: Vec<FileRecord> = self
            .read()?
            .values()
            .filter(|record| record.is_expired(as_of))
            .cloned()
            .collect();
        expired.sort_by_key(|record| record.expires_at);
        Ok(expired)
    }

    fn list_all(&self) -> Result<Vec<FileRecord>, FileError> {
        let mut all: Vec<FileRecord> = self.read()?.values().cloned().collect();
        all.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at).then_with(|| a.id.cmp(&b.id)));
        Ok(all)
    }

    fn exists(&self, id: &str) -> Result<bool, FileError> {
        Ok(self.read()?.contains_key(id))
    }

    fn activate(&self, id: &str) -> Result<(), FileError> {
        let mut records = self.write()?;
        let record = records.get_mut(id).ok_or(FileError::NotFound)?;
        record.status = RecordStatus::Active;
        Ok(())
    }

    fn stored_handles(&self) -> Result<HashSet<String>, FileError> {
        Ok(self.read()?.values().map(|record| record.stored_handle.clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::test_support::sample_record;
    use chrono::Duration;

    #[test]
    fn test_mock_metadata_store_basic_operations() {
        let store = MockMetadataStore::new();
        let now = Utc::now();

        assert_eq!(store.record_count(), 0);

        store.insert(&sample_record("mock01", now, Duration::hours(1))).unwrap();
        assert_eq!(store.record_count(), 1);

        // Duplicate key should fail
        let result = store.insert(&sample_record("mock01", now, Duration::hours(2)));
        assert!(matches!(result, Err(FileError::DuplicateKey(_))));

        assert!(store.exists("mock01").unwrap());
        assert!(!store.exists("nonexistent").unwrap());

        let retrieved = store.get("mock01").unwrap();
        assert_eq!(retrieved.expires_at, now + Duration::hours(1));

        store.delete("mock01").unwrap();
        assert_eq!(store.record_count(), 0);

        store.insert(&sample_record("mock02", now, Duration::hours(1))).unwrap();
        store.clear();
        assert_eq!(store.record_count(), 0);
    }

    #[test]
    fn test_mock_metadata_store_error_cases() {
        let store = MockMetadataStore::new();

        assert!(matches!(store.get("missing"), Err(FileError::NotFound)));
        assert!(matches!(store.delete("missing"), Err(FileError::NotFound)));
        assert!(matches!(store.activate("missing"), Err(FileError::NotFound)));
        assert!(store.list_all().unwrap().is_empty());
        assert!(store.list_expired(Utc::now()).unwrap().is_empty());
    }
}
