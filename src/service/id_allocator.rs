//! Opaque identifier allocation.
//!
//! Candidates are checked against the metadata store and against ids leased
//! to concurrent uploads that have not committed yet. The metadata store's
//! duplicate-key insert stays the final word on uniqueness.

use crate::config::IdentifierConfig;
use crate::error::FileError;
use crate::metadata::MetadataStorage;
use log::{debug, warn};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

type LeaseSet = Arc<Mutex<HashSet<String>>>;

fn lock(leases: &LeaseSet) -> Result<MutexGuard<'_, HashSet<String>>, FileError> {
    leases
        .lock()
        .map_err(|_| FileError::Storage("identifier lease lock poisoned".to_string()))
}

/// Random identifier over `[A-Za-z0-9]`
pub fn random_id(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// Reservation of a candidate id, released on drop
#[derive(Debug)]
pub struct IdLease {
    id: String,
    leases: LeaseSet,
}

impl IdLease {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for IdLease {
    fn drop(&mut self) {
        if let Ok(mut leases) = self.leases.lock() {
            leases.remove(&self.id);
        }
    }
}

pub struct IdAllocator {
    metadata: Arc<dyn MetadataStorage>,
    config: IdentifierConfig,
    leases: LeaseSet,
}

impl IdAllocator {
    pub fn new(metadata: Arc<dyn MetadataStorage>, config: IdentifierConfig) -> Self {
        Self {
            metadata,
            config,
            leases: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Lease an identifier no live record or in-flight upload holds.
    ///
    /// Tries `attempts_per_length` candidates per length, growing the length
    /// by one on saturation until `max_length` is exhausted.
    pub fn allocate(&self) -> Result<IdLease, FileError> {
        for length in self.config.length..=self.config.max_length {
            for _ in 0..self.config.attempts_per_length {
                let candidate = random_id(length);
                if self.metadata.exists(&candidate)? {
                    debug!("Identifier candidate {} already taken", candidate);
                    continue;
                }
                if lock(&self.leases)?.insert(candidate.clone()) {
                    return Ok(IdLease {
                        id: candidate,
                        leases: Arc::clone(&self.leases),
                    });
                }
            }
            warn!("Identifier space saturated at length {}", length);
        }
        Err(FileError::Storage("identifier space exhausted".to_string()))
    }

    /// Number of ids currently leased
    pub fn leased(&self) -> usize {
        self.leases.lock().map(|leases| leases.len()).unwrap_or(0)
    }
}
