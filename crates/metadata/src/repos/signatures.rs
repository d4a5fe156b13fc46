//! Signature record repository.

use crate::error::MetadataResult;
use crate::models::SignatureRow;
use async_trait::async_trait;
use uuid::Uuid;

/// Repository for signature records.
///
/// Stores enforce at most one `pending` or `signed` row per
/// `(document_id, signer_id)` and never rewrite `document_hash_at_request`.
#[async_trait]
pub trait SignatureRepo: Send + Sync {
    /// Insert a new record.
    ///
    /// Fails with `AlreadyExists` when the signer already holds an active
    /// record for the document.
    async fn insert_signature(&self, row: &SignatureRow) -> MetadataResult<()>;

    /// Delete the signer's pending record (if any) and insert `row`, in one
    /// transaction. Returns the number of pending rows discarded.
    async fn insert_signature_discarding_pending(&self, row: &SignatureRow)
    -> MetadataResult<u64>;

    /// Get a record by ID.
    async fn get_signature(&self, signature_id: Uuid) -> MetadataResult<Option<SignatureRow>>;

    /// Get the signer's pending or signed record for a document.
    async fn get_active_signature(
        &self,
        document_id: Uuid,
        signer_id: &str,
    ) -> MetadataResult<Option<SignatureRow>>;

    /// Full history for a document, oldest first.
    async fn list_signatures(&self, document_id: Uuid) -> MetadataResult<Vec<SignatureRow>>;

    /// Signed records for a document, oldest first.
    async fn list_signed_signatures(&self, document_id: Uuid)
    -> MetadataResult<Vec<SignatureRow>>;

    /// Compare-and-swap update of a record's mutable columns.
    ///
    /// Applies only while the stored row still has `expected_state` and the
    /// revision carried by `row`. Bumps the revision on success. Returns
    /// `false` when another writer got there first.
    async fn update_signature(&self, row: &SignatureRow, expected_state: &str)
    -> MetadataResult<bool>;
}
