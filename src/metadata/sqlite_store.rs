//! SQLite implementation of MetadataStorage trait

use crate::config::MetadataConfig;
use crate::error::FileError;
use crate::metadata::{FileRecord, MetadataStorage, RecordStatus};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS files (
        id TEXT PRIMARY KEY,
        stored_handle TEXT NOT NULL UNIQUE,
        original_name TEXT NOT NULL,
        size_bytes INTEGER NOT NULL,
        uploaded_at INTEGER NOT NULL,
        expires_at INTEGER NOT NULL,
        password_hash TEXT,
        checksum TEXT NOT NULL,
        status TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS files_expires_at ON files (expires_at);
";

const COLUMNS: &str =
    "id, stored_handle, original_name, size_bytes, uploaded_at, expires_at, password_hash, checksum, status";

/// SQLite implementation of MetadataStorage.
///
/// Writes go through one connection behind a mutex, which serializes inserts
/// on the same key. Reads use a small pool of extra connections so lookups of
/// distinct ids do not queue behind each other (WAL mode lets them run next to
/// the writer).
pub struct SQLiteMetadataStore {
    writer: Mutex<Connection>,
    readers: Vec<Mutex<Connection>>,
    next_reader: AtomicUsize,
}

fn open_connection(path: &str) -> Result<Connection, FileError> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(conn)
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>, FileError> {
    conn.lock()
        .map_err(|_| FileError::Storage("metadata connection lock poisoned".to_string()))
}

fn timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let millis: i64 = row.get(idx)?;
    DateTime::<Utc>::from_timestamp_millis(millis).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, format!("timestamp out of range: {}", millis).into())
    })
}

fn read_record(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    let size: i64 = row.get(3)?;
    let status: String = row.get(8)?;
    let status = status
        .parse::<RecordStatus>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(8, Type::Text, Box::new(e)))?;
    Ok(FileRecord {
        id: row.get(0)?,
        stored_handle: row.get(1)?,
        original_name: row.get(2)?,
        size_bytes: size.max(0) as u64,
        uploaded_at: timestamp(row, 4)?,
        expires_at: timestamp(row, 5)?,
        password_hash: row.get(6)?,
        checksum: row.get(7)?,
        status,
    })
}

impl SQLiteMetadataStore {
    /// Open (or create) the database described by `config`
    pub fn open(config: &MetadataConfig) -> Result<Self, FileError> {
        let in_memory = config.db_path == ":memory:";
        if !in_memory {
            if let Some(parent) = Path::new(&config.db_path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        warn!("Failed to create metadata directory {}: {}", parent.display(), e);
                        FileError::Storage("failed to create metadata directory".to_string())
                    })?;
                }
            }
        }

        let writer = open_connection(&config.db_path)?;
        if config.wal_mode && !in_memory {
            let mode: String = writer.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
            debug!("SQLite journal mode: {}", mode);
        }
        writer.execute_batch(SCHEMA)?;

        // Every in-memory connection is its own database, so reads share the writer.
        let reader_count = if in_memory { 0 } else { config.pool_size as usize };
        let readers = (0..reader_count)
            .map(|_| open_connection(&config.db_path).map(Mutex::new))
            .collect::<Result<Vec<_>, _>>()?;

        info!("Opened metadata database {} with {} reader connections", config.db_path, readers.len());
        Ok(Self {
            writer: Mutex::new(writer),
            readers,
            next_reader: AtomicUsize::new(0),
        })
    }

    /// In-memory database, handy for tests
    pub fn in_memory() -> Result<Self, FileError> {
        Self::open(&MetadataConfig {
            db_path: ":memory:".to_string(),
            ..MetadataConfig::default()
        })
    }

    fn with_reader<T>(&self, f: impl FnOnce(&Connection) -> Result<T, FileError>) -> Result<T, FileError> {
        if self.readers.is_empty() {
            return f(&*lock(&self.writer)?);
        }
        for reader in &self.readers {
            if let Ok(conn) = reader.try_lock() {
                return f(&*conn);
            }
        }
        let idx = self.next_reader.fetch_add(1, Ordering::Relaxed) % self.readers.len();
        f(&*lock(&self.readers[idx])?)
    }

    fn query_records(&self, sql: &str, param: Option<i64>) -> Result<Vec<FileRecord>, FileError> {
        self.with_reader(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let rows = match param {
                Some(value) => stmt.query_map(params![value], read_record)?,
                None => stmt.query_map([], read_record)?,
            };
            let mut records = Vec::new();
            for row in rows {
                records.push(row?);
            }
            Ok(records)
        })
    }
}

impl MetadataStorage for SQLiteMetadataStore {
    fn insert(&self, record: &FileRecord) -> Result<(), FileError> {
        let conn = lock(&self.writer)?;
        let result = conn.execute(
            &format!("INSERT INTO files ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)", COLUMNS),
            params![
                record.id,
                record.stored_handle,
                record.original_name,
                record.size_bytes as i64,
                record.uploaded_at.timestamp_millis(),
                record.expires_at.timestamp_millis(),
                record.password_hash,
                record.checksum,
                record.status.as_str(),
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _)) if err.code == ErrorCode::ConstraintViolation => {
                debug!("Insert rejected, key already present: {}", record.id);
                Err(FileError::DuplicateKey(record.id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn get(&self, id: &str) -> Result<FileRecord, FileError> {
        self.with_reader(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM files WHERE id = ?1", COLUMNS),
                params![id],
                read_record,
            )
            .optional()?
            .ok_or(FileError::NotFound)
        })
    }

    fn delete(&self, id: &str) -> Result<(), FileError> {
        let conn = lock(&self.writer)?;
        let removed = conn.execute("DELETE FROM files WHERE id = ?1", params![id])?;
        if removed == 0 {
            return Err(FileError::NotFound);
        }
        Ok(())
    }

    fn list_expired(&self, as_of: DateTime<Utc>) -> Result<Vec<FileRecord>, FileError> {
        self.query_records(
            &format!("SELECT {} FROM files WHERE expires_at <= ?1 ORDER BY expires_at", COLUMNS),
            Some(as_of.timestamp_millis()),
        )
    }

    fn list_all(&self) -> Result<Vec<FileRecord>, FileError> {
        self.query_records(
            &format!("SELECT {} FROM files ORDER BY uploaded_at DESC, id", COLUMNS),
            None,
        )
    }

    fn exists(&self, id: &str) -> Result<bool, FileError> {
        self.with_reader(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM files WHERE id = ?1", params![id], |row| row.get(0))?;
            Ok(count > 0)
        })
    }

    fn activate(&self, id: &str) -> Result<(), FileError> {
        let conn = lock(&self.writer)?;
        let updated = conn.execute(
            "UPDATE files SET status = ?1 WHERE id = ?2",
            params![RecordStatus::Active.as_str(), id],
        )?;
        if updated == 0 {
            return Err(FileError::NotFound);
        }
        Ok(())
    }

    fn stored_handles(&self) -> Result<HashSet<String>, FileError> {
        self.with_reader(|conn| {
            let mut stmt = conn.prepare("SELECT stored_handle FROM files")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            let mut handles = HashSet::new();
            for row in rows {
                handles.insert(row?);
            }
            Ok(handles)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::test_support::sample_record;
    use chrono::Duration;

    fn file_store(dir: &tempfile::TempDir) -> SQLiteMetadataStore {
        SQLiteMetadataStore::open(&MetadataConfig {
            db_path: dir.path().join("meta").join("files.db").to_string_lossy().into_owned(),
            ..MetadataConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_sqlite_metadata_store_basic_operations() {
        let dir = tempfile::tempdir().unwrap();
        let store = file_store(&dir);
        let now = Utc::now();
        let mut record = sample_record("aB3dE9", now, Duration::hours(1));
        record.password_hash = Some("$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA".to_string());

        store.insert(&record).unwrap();
        assert!(store.exists("aB3dE9").unwrap());
        assert!(!store.exists("nonexistent").unwrap());

        let retrieved = store.get("aB3dE9").unwrap();
        assert_eq!(retrieved.id, record.id);
        assert_eq!(retrieved.stored_handle, record.stored_handle);
        assert_eq!(retrieved.password_hash, record.password_hash);
        assert_eq!(retrieved.expires_at.timestamp_millis(), record.expires_at.timestamp_millis());
        assert_eq!(retrieved.status, RecordStatus::Active);

        assert!(store.stored_handles().unwrap().contains("handle-aB3dE9"));

        store.delete("aB3dE9").unwrap();
        assert!(matches!(store.get("aB3dE9"), Err(FileError::NotFound)));
        assert!(matches!(store.delete("aB3dE9"), Err(FileError::NotFound)));
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let store = SQLiteMetadataStore::in_memory().unwrap();
        let now = Utc::now();
        store.insert(&sample_record("dup001", now, Duration::hours(1))).unwrap();

        let mut second = sample_record("dup001", now, Duration::hours(2));
        second.stored_handle = "another-handle".to_string();
        assert!(matches!(store.insert(&second), Err(FileError::DuplicateKey(id)) if id == "dup001"));
    }

    #[test]
    fn test_pending_then_activate() {
        let store = SQLiteMetadataStore::in_memory().unwrap();
        let mut record = sample_record("pend01", Utc::now(), Duration::minutes(5));
        record.status = RecordStatus::Pending;
        store.insert(&record).unwrap();
        assert_eq!(store.get("pend01").unwrap().status, RecordStatus::Pending);

        store.activate("pend01").unwrap();
        assert_eq!(store.get("pend01").unwrap().status, RecordStatus::Active);
        assert!(matches!(store.activate("missing"), Err(FileError::NotFound)));
    }

    #[test]
    fn test_reopen_keeps_records() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = file_store(&dir);
            store.insert(&sample_record("keep01", Utc::now(), Duration::days(7))).unwrap();
        }
        let store = file_store(&dir);
        assert!(store.exists("keep01").unwrap());
    }
}
