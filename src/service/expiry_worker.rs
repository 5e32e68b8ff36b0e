//! Background expiry worker
//!
//! Runs periodically and removes every file whose expiry has passed, blob
//! first and then metadata. A sweep that overlaps a running one is skipped.

use crate::config::SweeperConfig;
use crate::error::FileError;
use crate::service::{run_blocking, FileService};
use chrono::{DateTime, Utc};
use log::{debug, error, info};
use std::sync::{Arc, TryLockError};
use std::time::Duration;
use tokio::time;
use tokio_util::sync::CancellationToken;

impl FileService {
    /// Remove everything that expired at or before `now`.
    ///
    /// Returns how many files this call removed. Rows another caller already
    /// removed are skipped without error.
    pub fn sweep(&self, now: DateTime<Utc>) -> Result<usize, FileError> {
        let _running = match self.sweep_guard.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => {
                debug!("Sweep already running, skipping");
                return Ok(0);
            }
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };

        let expired = self.metadata.list_expired(now)?;
        if expired.is_empty() {
            return Ok(0);
        }

        info!("Sweeping {} expired files", expired.len());
        let mut removed = 0;
        for record in &expired {
            match self.remove_record(record) {
                Ok(true) => {
                    debug!("Expired {} ({} bytes)", record.id, record.size_bytes);
                    removed += 1;
                }
                Ok(false) => debug!("File {} was already removed", record.id),
                // Continue with other files even if one fails
                Err(e) => error!("Failed to remove expired file {}: {}", record.id, e),
            }
        }
        Ok(removed)
    }
}

pub struct ExpiryWorker {
    service: Arc<FileService>,
    interval: Duration,
}

impl ExpiryWorker {
    pub fn new(service: Arc<FileService>, interval: Duration) -> Self {
        Self { service, interval }
    }

    pub fn from_config(service: Arc<FileService>, config: &SweeperConfig) -> Self {
        Self::new(service, Duration::from_secs(config.interval_secs))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start the worker as a background task (non-blocking). It stops once
    /// `shutdown` is cancelled.
    pub fn start_background(self, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        info!("Starting expiry worker with {}s interval", self.interval.as_secs());

        tokio::spawn(async move {
            let mut interval = time::interval(self.interval);
            interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Expiry worker stopped");
                        break;
                    }
                    _ = interval.tick() => {
                        if let Err(e) = self.run_once().await {
                            error!("Error sweeping expired files: {}", e);
                        }
                    }
                }
            }
        })
    }

    /// One sweep, off the async executor
    pub async fn run_once(&self) -> Result<usize, FileError> {
        let service = Arc::clone(&self.service);
        run_blocking("sweep", move || {
            let now = service.now();
            service.sweep(now)
        })
        .await
    }
}
