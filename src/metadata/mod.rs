//! Metadata Storage Layer Abstraction
//!
//! This module provides an abstraction over the durable table of file records,
//! allowing the lifecycle service to run against SQLite or an in-memory store
//! without affecting higher-level code. The store is the single authority on
//! identifier uniqueness: `insert` fails with `FileError::DuplicateKey` when the
//! id is already present, whatever the record's state.

pub mod sqlite_store;
pub mod mock_store;
pub mod config;

#[cfg(test)]
mod comprehensive_test;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::FileError;

/// Object identifier type
pub type FileId = String;

/// Visibility state of a committed record
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RecordStatus {
    /// Row written, blob not yet published. Invisible to readers.
    Pending,
    /// Blob published and retrievable until `expires_at`.
    Active,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Pending => "pending",
            RecordStatus::Active => "active",
        }
    }
}

impl std::str::FromStr for RecordStatus {
    type Err = FileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RecordStatus::Pending),
            "active" => Ok(RecordStatus::Active),
            other => Err(FileError::Storage(format!("unknown record status: {}", other))),
        }
    }
}

/// A stored file and everything needed to serve or collect it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileRecord {
    pub id: FileId,
    /// Blob name inside blob storage; never leaves the service
    pub stored_handle: String,
    pub original_name: String,
    pub size_bytes: u64,
    pub uploaded_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Argon2 PHC string
    pub password_hash: Option<String>,
    /// MD5 hex digest of the content
    pub checksum: String,
    pub status: RecordStatus,
}

impl FileRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Active and not expired as of `now`
    pub fn is_visible(&self, now: DateTime<Utc>) -> bool {
        self.status == RecordStatus::Active && !self.is_expired(now)
    }

    pub fn summary(&self) -> FileSummary {
        FileSummary {
            id: self.id.clone(),
            original_name: self.original_name.clone(),
            uploaded_at: self.uploaded_at,
            expires_at: self.expires_at,
            size_bytes: self.size_bytes,
        }
    }
}

/// Public listing entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileSummary {
    pub id: FileId,
    pub original_name: String,
    pub uploaded_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub size_bytes: u64,
}

/// Trait defining the metadata storage interface
pub trait MetadataStorage: Send + Sync {
    /// Insert a new record; `DuplicateKey` if the id is taken
    fn insert(&self, record: &FileRecord) -> Result<(), FileError>;

    /// Point lookup; `NotFound` if absent
    fn get(&self, id: &str) -> Result<FileRecord, FileError>;

    /// Remove a record; `NotFound` if absent
    fn delete(&self, id: &str) -> Result<(), FileError>;

    /// Records with `expires_at <= as_of`, regardless of status
    fn list_expired(&self, as_of: DateTime<Utc>) -> Result<Vec<FileRecord>, FileError>;

    /// All records, newest upload first
    fn list_all(&self) -> Result<Vec<FileRecord>, FileError>;

    /// Whether any record (pending, active or expired) holds the id
    fn exists(&self, id: &str) -> Result<bool, FileError>;

    /// Flip a pending record to active; `NotFound` if absent
    fn activate(&self, id: &str) -> Result<(), FileError>;

    /// Every stored handle referenced by a record
    fn stored_handles(&self) -> Result<HashSet<String>, FileError>;
}
