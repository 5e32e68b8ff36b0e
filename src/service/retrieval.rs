//! Download path: the expiry and password gate, then a guarded byte stream.

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use log::{debug, info, warn};
use std::fmt;
use std::pin::Pin;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;

use crate::error::FileError;
use crate::service::password::verify_password;
use crate::service::FileService;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, FileError>> + Send>>;

pub const CONTENT_TYPE: &str = "application/octet-stream";

/// An authorized download, ready to be streamed
pub struct Download {
    pub id: String,
    pub original_name: String,
    pub content_type: &'static str,
    pub size_bytes: u64,
    pub checksum: String,
    pub stream: ByteStream,
}

impl fmt::Debug for Download {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Download")
            .field("id", &self.id)
            .field("original_name", &self.original_name)
            .field("content_type", &self.content_type)
            .field("size_bytes", &self.size_bytes)
            .field("checksum", &self.checksum)
            .finish_non_exhaustive()
    }
}

impl Download {
    /// Drain the stream into memory
    pub async fn into_bytes(mut self) -> Result<Vec<u8>, FileError> {
        let mut content = Vec::with_capacity(self.size_bytes as usize);
        while let Some(chunk) = self.stream.next().await {
            content.extend_from_slice(&chunk?);
        }
        Ok(content)
    }
}

impl FileService {
    /// Resolve `id` to a readable stream.
    ///
    /// Absent, pending and expired files all answer `NotFound`, and that
    /// check comes before the password so an expired file never leaks
    /// whether it was protected.
    pub fn download(
        &self,
        id: &str,
        password: Option<&str>,
        cancel: CancellationToken,
    ) -> Result<Download, FileError> {
        let record = self.metadata.get(id)?;
        if !record.is_visible(self.now()) {
            debug!("File {} is not downloadable (status {:?})", id, record.status);
            return Err(FileError::NotFound);
        }

        if let Some(hash) = record.password_hash.as_deref() {
            let supplied = password.filter(|p| !p.is_empty());
            match supplied {
                Some(candidate) if verify_password(hash, candidate) => {}
                _ => {
                    warn!("Rejected download of {}: password mismatch", id);
                    return Err(FileError::Auth);
                }
            }
        }

        // The sweeper may have removed the blob after the row was read
        let reader = self.storage.open(&record.stored_handle).map_err(|e| {
            if !matches!(e, FileError::NotFound) {
                warn!("Blob for {} could not be opened: {}", id, e);
            }
            FileError::NotFound
        })?;
        info!("Serving {} ({} bytes)", record.id, record.size_bytes);

        let stream = guarded_stream(
            ReaderStream::with_capacity(reader, self.ingest.chunk_size),
            cancel,
            self.ingest.read_timeout(),
        );

        Ok(Download {
            id: record.id,
            original_name: record.original_name,
            content_type: CONTENT_TYPE,
            size_bytes: record.size_bytes,
            checksum: record.checksum,
            stream,
        })
    }
}

/// Stop at the first error, on cancellation, or when a read stalls past `read_timeout`.
fn guarded_stream<S>(inner: S, cancel: CancellationToken, read_timeout: std::time::Duration) -> ByteStream
where
    S: Stream<Item = std::io::Result<Bytes>> + Send + Unpin + 'static,
{
    Box::pin(stream::unfold(Some((inner, cancel)), move |state| async move {
        let Some((mut inner, cancel)) = state else { return None };
        let next = tokio::select! {
            _ = cancel.cancelled() => Err(FileError::Cancelled),
            next = tokio::time::timeout(read_timeout, inner.next()) => {
                next.map_err(|_| FileError::Timeout(read_timeout))
            }
        };
        match next {
            Ok(Some(Ok(chunk))) => Some((Ok(chunk), Some((inner, cancel)))),
            Ok(Some(Err(e))) => {
                warn!("Blob read failed mid-stream: {}", e);
                Some((Err(FileError::NotFound), None))
            }
            Ok(None) => None,
            Err(e) => Some((Err(e), None)),
        }
    }))
}
