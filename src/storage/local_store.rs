//! Local filesystem blob storage implementation

use crate::config::StorageConfig;
use crate::error::FileError;
use crate::storage::{new_handle, validate_handle, BlobReader, BlobStorage, BlobWriter};
use log::{debug, error, info, warn};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const TEMP_SUFFIX: &str = "part";

fn ensure_directory(path: &Path) -> Result<(), FileError> {
    if !path.exists() {
        fs::create_dir_all(path).map_err(|e| {
            error!("Failed to create storage directory {}: {}", path.display(), e);
            FileError::Storage("failed to create storage directory".to_string())
        })?;
        info!("Created storage directory {}", path.display());
    }
    Ok(())
}

fn io_failure(action: &str, path: &Path, e: io::Error) -> FileError {
    error!("Failed to {} {}: {}", action, path.display(), e);
    FileError::Storage(format!("failed to {}: {}", action, e.kind()))
}

/// Published blobs live in `base_path/<handle>`, uploads in progress in
/// `temp_path/<handle>.part`. Both directories must share a filesystem so
/// that publishing is a single rename.
pub struct LocalFsBlobStore {
    storage_path: PathBuf,
    temp_path: PathBuf,
}

impl LocalFsBlobStore {
    pub fn new(config: &StorageConfig) -> Result<Self, FileError> {
        let storage_path = PathBuf::from(&config.base_path);
        let temp_path = PathBuf::from(&config.temp_path);
        ensure_directory(&storage_path)?;
        ensure_directory(&temp_path)?;
        info!(
            "Using local blob storage at {} (temp: {})",
            storage_path.display(),
            temp_path.display()
        );
        Ok(Self { storage_path, temp_path })
    }

    fn blob_path(&self, stored_handle: &str) -> Result<PathBuf, FileError> {
        validate_handle(stored_handle)?;
        Ok(self.storage_path.join(stored_handle))
    }

    fn temp_file_path(&self, temp_handle: &str) -> Result<PathBuf, FileError> {
        validate_handle(temp_handle)?;
        Ok(self.temp_path.join(format!("{}.{}", temp_handle, TEMP_SUFFIX)))
    }

    /// Regular files directly under `dir` whose stem is a valid handle
    fn list_handles(dir: &Path, suffix: Option<&str>) -> Result<Vec<String>, FileError> {
        let entries = fs::read_dir(dir).map_err(|e| io_failure("list", dir, e))?;
        let mut handles = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| io_failure("list", dir, e))?;
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            if !is_file {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let handle = match suffix {
                Some(suffix) => match name.strip_suffix(&format!(".{}", suffix)) {
                    Some(stem) => stem.to_string(),
                    None => continue,
                },
                None => name,
            };
            if validate_handle(&handle).is_ok() {
                handles.push(handle);
            }
        }
        Ok(handles)
    }
}

/// Writer over a `.part` file in the temp directory
pub struct LocalBlobWriter {
    handle: String,
    path: PathBuf,
    file: File,
}

impl BlobWriter for LocalBlobWriter {
    fn temp_handle(&self) -> &str {
        &self.handle
    }

    fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), FileError> {
        self.file
            .write_all(chunk)
            .map_err(|e| io_failure("write temp blob", &self.path, e))
    }

    fn finish(&mut self) -> Result<(), FileError> {
        self.file
            .flush()
            .and_then(|_| self.file.sync_all())
            .map_err(|e| io_failure("sync temp blob", &self.path, e))
    }
}

impl BlobStorage for LocalFsBlobStore {
    fn create_temp(&self) -> Result<Box<dyn BlobWriter>, FileError> {
        let handle = new_handle();
        let path = self.temp_file_path(&handle)?;
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| io_failure("create temp blob", &path, e))?;
        debug!("Created temp blob {}", path.display());
        Ok(Box::new(LocalBlobWriter { handle, path, file }))
    }

    fn discard_temp(&self, temp_handle: &str) -> Result<(), FileError> {
        let path = self.temp_file_path(temp_handle)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("Discarded temp blob {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_failure("discard temp blob", &path, e)),
        }
    }

    fn publish(&self, temp_handle: &str, stored_handle: &str) -> Result<(), FileError> {
        let from = self.temp_file_path(temp_handle)?;
        let to = self.blob_path(stored_handle)?;
        if to.exists() {
            warn!("Refusing to publish over existing blob {}", to.display());
            return Err(FileError::Storage("blob handle already in use".to_string()));
        }
        fs::rename(&from, &to).map_err(|e| io_failure("publish blob", &to, e))?;
        debug!("Published {} as {}", from.display(), to.display());
        Ok(())
    }

    fn open(&self, stored_handle: &str) -> Result<BlobReader, FileError> {
        let path = self.blob_path(stored_handle)?;
        match File::open(&path) {
            Ok(file) => Ok(Box::new(tokio::fs::File::from_std(file))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(FileError::NotFound),
            Err(e) => Err(io_failure("open blob", &path, e)),
        }
    }

    fn delete(&self, stored_handle: &str) -> Result<bool, FileError> {
        let path = self.blob_path(stored_handle)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_failure("delete blob", &path, e)),
        }
    }

    fn exists(&self, stored_handle: &str) -> Result<bool, FileError> {
        Ok(self.blob_path(stored_handle)?.is_file())
    }

    fn list_blobs(&self) -> Result<Vec<String>, FileError> {
        Self::list_handles(&self.storage_path, None)
    }

    fn list_temp(&self) -> Result<Vec<String>, FileError> {
        Self::list_handles(&self.temp_path, Some(TEMP_SUFFIX))
    }

    fn purge_temp(&self) -> Result<usize, FileError> {
        let handles = self.list_temp()?;
        for handle in &handles {
            self.discard_temp(handle)?;
        }
        if !handles.is_empty() {
            info!("Purged {} leftover temp blobs", handles.len());
        }
        Ok(handles.len())
    }
}
