//! Locally generated signature blobs for the Demo and HSM modalities.
//!
//! These are opaque tokens derived with SHA-256, not cryptographic
//! signatures. The timestamp is part of the input, so repeated signing of the
//! same document yields different blobs.

use rubrica_core::{ContentHash, DocumentId, SignatureBlob};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::error::{SigningError, SigningResult};

fn rfc3339(at: OffsetDateTime) -> SigningResult<String> {
    at.format(&Rfc3339)
        .map_err(|e| SigningError::Internal(format!("failed to format timestamp: {e}")))
}

fn digest_blob(input: &str) -> SignatureBlob {
    SignatureBlob::encode(&Sha256::digest(input.as_bytes()))
}

/// `base64(sha256("<documentId>|<contentHash>|<signerId>|<timestamp>"))`
pub fn demo_blob(
    document_id: &DocumentId,
    content_hash: &ContentHash,
    signer_id: &str,
    at: OffsetDateTime,
) -> SigningResult<SignatureBlob> {
    let ts = rfc3339(at)?;
    Ok(digest_blob(&format!(
        "{document_id}|{}|{signer_id}|{ts}",
        content_hash.to_hex()
    )))
}

/// `base64(sha256("<documentHash>|HSM|<timestamp>"))`
pub fn hsm_blob(document_hash: &ContentHash, at: OffsetDateTime) -> SigningResult<SignatureBlob> {
    let ts = rfc3339(at)?;
    Ok(digest_blob(&format!("{}|HSM|{ts}", document_hash.to_hex())))
}
