//! Core domain types and shared logic for the Rubrica signature service.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Documents and their coarse signing state
//! - Signature records, modalities and the per-record state machine
//! - Typed signature metadata
//! - Content hashing
//! - Token scopes and authorization

pub mod config;
pub mod document;
pub mod error;
pub mod hash;
pub mod signature;
pub mod signature_meta;
pub mod token;

pub use config::CompletionPolicy;
pub use document::{Document, DocumentId, DocumentState};
pub use error::{Error, Result};
pub use hash::{ContentHash, ContentHasher};
pub use signature::{
    ExternalReference, Modality, Nonce, RequestContext, SignatureBlob, SignatureId,
    SignatureRecord, SignatureState,
};
pub use signature_meta::{Extra, HsmHistoryEntry, SignatureMetadata};
pub use token::{Token, TokenId, TokenScope};

/// Hash algorithm advertised to Token clients.
pub const SIGNATURE_HASH_ALGORITHM: &str = "SHA-256";

/// Default maximum document size: 64 MiB
pub const DEFAULT_MAX_DOCUMENT_SIZE: u64 = 64 * 1024 * 1024;
