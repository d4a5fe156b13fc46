//! Document repository.

use crate::error::MetadataResult;
use crate::models::DocumentRow;
use async_trait::async_trait;
use rubrica_core::DocumentState;
use time::OffsetDateTime;
use uuid::Uuid;

/// Repository for registered documents.
#[async_trait]
pub trait DocumentRepo: Send + Sync {
    /// Insert a newly registered document.
    async fn create_document(&self, document: &DocumentRow) -> MetadataResult<()>;

    /// Get a document by ID.
    async fn get_document(&self, document_id: Uuid) -> MetadataResult<Option<DocumentRow>>;

    /// Move the document state forward to `target`.
    ///
    /// The update is conditional on the stored state ranking below `target`,
    /// so concurrent callers can never move it backwards. Returns `true` if
    /// the row changed.
    async fn advance_document_state(
        &self,
        document_id: Uuid,
        target: DocumentState,
        updated_at: OffsetDateTime,
    ) -> MetadataResult<bool>;

    /// List documents attached to a case, newest first.
    async fn list_documents_for_case(&self, case_id: &str) -> MetadataResult<Vec<DocumentRow>>;
}
