//! Signing workflow error types.

use rubrica_metadata::MetadataError;
use rubrica_storage::StorageError;
use thiserror::Error;

/// Signing workflow errors.
#[derive(Debug, Error)]
pub enum SigningError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Stable error classification exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    InvalidRequest,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::Internal => "internal_error",
        }
    }
}

impl SigningError {
    /// Classify the error. Persistence and storage failures are internal.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SigningError::NotFound(_) => ErrorKind::NotFound,
            SigningError::Conflict(_) => ErrorKind::Conflict,
            SigningError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            SigningError::Metadata(_) | SigningError::Storage(_) | SigningError::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }
}

/// Result type for signing operations.
pub type SigningResult<T> = std::result::Result<T, SigningError>;
