//! Error taxonomy shared by every layer of the file lifecycle.
//!
//! Messages are safe to hand to clients: storage paths are logged where the
//! failure happens and never embedded in a `FileError`.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

/// Errors produced by the ingest, retrieval, delete and sweep operations.
#[derive(Debug, Error)]
pub enum FileError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("file exceeds the maximum size of {limit} bytes")]
    Capacity { limit: u64 },

    #[error("file not found")]
    NotFound,

    #[error("password missing or incorrect")]
    Auth,

    #[error("storage error: {0}")]
    Storage(String),

    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    #[error("upload stream failed: {0}")]
    Transfer(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
}

impl FileError {
    /// Stable machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            FileError::Validation(_) => "validation",
            FileError::Capacity { .. } => "capacity",
            FileError::NotFound => "not_found",
            FileError::Auth => "auth",
            FileError::Storage(_) => "storage",
            FileError::DuplicateKey(_) => "storage",
            FileError::Transfer(_) => "transfer",
            FileError::Cancelled => "cancelled",
            FileError::Timeout(_) => "timeout",
        }
    }
}

impl From<rusqlite::Error> for FileError {
    fn from(e: rusqlite::Error) -> Self {
        FileError::Storage(format!("metadata database error: {}", e))
    }
}

impl ResponseError for FileError {
    fn status_code(&self) -> StatusCode {
        match self {
            FileError::Validation(_) | FileError::Transfer(_) => StatusCode::BAD_REQUEST,
            FileError::Capacity { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            FileError::NotFound => StatusCode::NOT_FOUND,
            FileError::Auth => StatusCode::FORBIDDEN,
            FileError::Storage(_) | FileError::DuplicateKey(_) => StatusCode::INTERNAL_SERVER_ERROR,
            FileError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            FileError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "error": self.kind(),
            "message": self.to_string(),
        }))
    }
}
