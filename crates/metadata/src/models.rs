//! Database models mapping to the metadata schema.

use crate::error::{MetadataError, MetadataResult};
use rubrica_core::{
    ContentHash, Document, DocumentId, DocumentState, ExternalReference, Modality, SignatureBlob,
    SignatureId, SignatureMetadata, SignatureRecord, SignatureState,
};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Documents
// =============================================================================

/// Registered document record.
#[derive(Debug, Clone, FromRow)]
pub struct DocumentRow {
    pub document_id: Uuid,
    pub case_id: Option<String>,
    pub title: Option<String>,
    pub content_hash: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub storage_ref: String,
    pub state: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl DocumentRow {
    pub fn from_document(doc: &Document) -> Self {
        Self {
            document_id: *doc.id.as_uuid(),
            case_id: doc.case_id.clone(),
            title: doc.title.clone(),
            content_hash: doc.content_hash.to_hex(),
            mime_type: doc.mime_type.clone(),
            size_bytes: i64::try_from(doc.size_bytes).unwrap_or(i64::MAX),
            storage_ref: doc.storage_ref.clone(),
            state: doc.state.as_str().to_string(),
            created_at: doc.created_at,
            updated_at: doc.updated_at,
        }
    }

    pub fn into_document(self) -> MetadataResult<Document> {
        Ok(Document {
            id: DocumentId::from_uuid(self.document_id),
            case_id: self.case_id,
            title: self.title,
            content_hash: ContentHash::from_hex(&self.content_hash)?,
            mime_type: self.mime_type,
            size_bytes: u64::try_from(self.size_bytes).map_err(|_| {
                MetadataError::Corrupt(format!(
                    "document {} has negative size {}",
                    self.document_id, self.size_bytes
                ))
            })?,
            storage_ref: self.storage_ref,
            state: DocumentState::parse(&self.state)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

// =============================================================================
// Signatures
// =============================================================================

/// One signing attempt.
///
/// `revision` increments on every update and backs the compare-and-swap
/// used for in-place transitions.
#[derive(Debug, Clone, FromRow)]
pub struct SignatureRow {
    pub signature_id: Uuid,
    pub document_id: Uuid,
    pub signer_id: String,
    pub modality: String,
    pub state: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub signed_at: Option<OffsetDateTime>,
    pub document_hash_at_request: String,
    pub certificate_serial: Option<String>,
    pub signature_blob: Option<String>,
    pub comment: Option<String>,
    pub external_reference: Option<String>,
    pub valid: bool,
    pub metadata: String, // JSON, tagged by "kind"
    pub revision: i64,
}

impl SignatureRow {
    pub fn from_record(record: &SignatureRecord, revision: i64) -> MetadataResult<Self> {
        Ok(Self {
            signature_id: *record.id.as_uuid(),
            document_id: *record.document_id.as_uuid(),
            signer_id: record.signer_id.clone(),
            modality: record.modality.as_str().to_string(),
            state: record.state.as_str().to_string(),
            created_at: record.created_at,
            updated_at: record.updated_at,
            signed_at: record.signed_at,
            document_hash_at_request: record.document_hash_at_request.to_hex(),
            certificate_serial: record.certificate_serial.clone(),
            signature_blob: record.signature_blob.as_ref().map(|b| b.as_str().to_string()),
            comment: record.comment.clone(),
            external_reference: record
                .external_reference
                .as_ref()
                .map(|r| r.as_str().to_string()),
            valid: record.valid,
            metadata: record.metadata.to_json()?,
            revision,
        })
    }

    pub fn into_record(self) -> MetadataResult<SignatureRecord> {
        Ok(SignatureRecord {
            id: SignatureId::from_uuid(self.signature_id),
            document_id: DocumentId::from_uuid(self.document_id),
            signer_id: self.signer_id,
            modality: Modality::parse(&self.modality)?,
            state: SignatureState::parse(&self.state)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
            signed_at: self.signed_at,
            document_hash_at_request: ContentHash::from_hex(&self.document_hash_at_request)?,
            certificate_serial: self.certificate_serial,
            signature_blob: self
                .signature_blob
                .as_deref()
                .map(SignatureBlob::parse)
                .transpose()?,
            comment: self.comment,
            external_reference: self
                .external_reference
                .as_deref()
                .map(ExternalReference::parse)
                .transpose()?,
            valid: self.valid,
            metadata: SignatureMetadata::from_json(&self.metadata)?,
        })
    }
}

// =============================================================================
// Tokens
// =============================================================================

/// API token record.
#[derive(Debug, Clone, FromRow)]
pub struct TokenRow {
    pub token_id: Uuid,
    pub subject: String,
    pub token_hash: String,
    pub scopes: String, // JSON array
    pub expires_at: Option<OffsetDateTime>,
    pub revoked_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub last_used_at: Option<OffsetDateTime>,
    pub description: Option<String>,
}
