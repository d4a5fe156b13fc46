//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid hash: {0}")]
    InvalidHash(String),

    #[error("invalid identifier: {0}")]
    InvalidId(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("invalid signature blob: {0}")]
    InvalidSignatureBlob(String),

    #[error("invalid nonce: {0}")]
    InvalidNonce(String),

    #[error("invalid external reference: {0}")]
    InvalidReference(String),

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
