//! Integrity verification of stored document bytes.

use crate::error::{SigningError, SigningResult};
use futures::StreamExt;
use rubrica_core::{ContentHash, Document, DocumentId, SignatureId, SignatureRecord};
use rubrica_metadata::MetadataStore;
use rubrica_metadata::models::SignatureRow;
use rubrica_storage::{ObjectStore, StorageError};
use serde::Serialize;
use std::sync::Arc;
use time::OffsetDateTime;

/// Outcome of verifying one document.
///
/// A hash mismatch or an unreadable object is reported here, never as an
/// error.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    pub document_id: DocumentId,
    pub integrity_ok: bool,
    /// Hash recorded at registration.
    pub recorded_hash: ContentHash,
    /// Hash of the bytes currently stored, when they could be read.
    pub computed_hash: Option<ContentHash>,
    pub read_error: Option<String>,
    /// Every signed record of the document.
    pub active_signatures: Vec<SignatureRecord>,
    /// Signed records whose pinned hash differs from the recorded or
    /// recomputed hash.
    pub drifted_signatures: Vec<SignatureId>,
    #[serde(with = "time::serde::rfc3339")]
    pub verified_at: OffsetDateTime,
}

/// Recomputes stored document hashes. Read-only.
pub struct IntegrityVerifier {
    metadata: Arc<dyn MetadataStore>,
    storage: Arc<dyn ObjectStore>,
}

impl IntegrityVerifier {
    pub fn new(metadata: Arc<dyn MetadataStore>, storage: Arc<dyn ObjectStore>) -> Self {
        Self { metadata, storage }
    }

    /// Verify a document. Fails only when the document does not exist or the
    /// metadata store is unavailable.
    #[tracing::instrument(skip(self), fields(document_id = %document_id))]
    pub async fn verify(&self, document_id: DocumentId) -> SigningResult<VerificationReport> {
        let document = self
            .metadata
            .get_document(*document_id.as_uuid())
            .await?
            .ok_or_else(|| SigningError::NotFound(format!("document {document_id}")))?
            .into_document()?;

        let (computed_hash, read_error) = match self.hash_stored(&document).await {
            Ok(hash) => (Some(hash), None),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read stored document bytes");
                (None, Some(e.to_string()))
            }
        };

        let active_signatures = self
            .metadata
            .list_signed_signatures(*document_id.as_uuid())
            .await?
            .into_iter()
            .map(SignatureRow::into_record)
            .collect::<Result<Vec<_>, _>>()?;

        let recorded_hash = document.content_hash;
        let drifted_signatures = active_signatures
            .iter()
            .filter(|r| {
                r.has_drifted_from(&recorded_hash)
                    || computed_hash.is_some_and(|h| r.has_drifted_from(&h))
            })
            .map(|r| r.id)
            .collect::<Vec<_>>();

        let integrity_ok = computed_hash == Some(recorded_hash);
        if !integrity_ok {
            tracing::warn!(
                recorded = %recorded_hash,
                computed = ?computed_hash,
                "Document integrity check failed"
            );
        }

        Ok(VerificationReport {
            document_id,
            integrity_ok,
            recorded_hash,
            computed_hash,
            read_error,
            active_signatures,
            drifted_signatures,
            verified_at: OffsetDateTime::now_utc(),
        })
    }

    /// Stream the stored bytes through the hasher.
    ///
    /// The stream owns the underlying handle and is dropped on every return
    /// path, including a failed chunk.
    async fn hash_stored(&self, document: &Document) -> Result<ContentHash, StorageError> {
        let mut stream = self.storage.get_stream(&document.storage_ref).await?;
        let mut hasher = ContentHash::hasher();
        while let Some(chunk) = stream.next().await {
            hasher.update(&chunk?);
        }
        Ok(hasher.finalize())
    }
}
