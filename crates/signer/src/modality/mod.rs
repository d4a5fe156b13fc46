//! Modality handlers.
//!
//! Each handler receives the signer's active record (if any) and performs its
//! write as a single atomic store operation: an insert guarded by the
//! one-active-record index, a discard-and-insert transaction, or a
//! compare-and-swap update of an existing row.

pub mod demo;
pub mod hsm;
pub mod token;

use crate::error::{SigningError, SigningResult};
use crate::projector::SignatureEvent;
use rubrica_core::{
    ContentHash, Document, Nonce, RequestContext, SignatureId, SignatureRecord, SignatureState,
};
use rubrica_metadata::models::SignatureRow;
use rubrica_metadata::{MetadataError, MetadataStore};
use serde::{Deserialize, Serialize};

/// Everything a handler needs to know about the attempt.
pub struct Attempt<'a> {
    pub store: &'a dyn MetadataStore,
    pub document: &'a Document,
    pub signer_id: &'a str,
    pub request: &'a RequestContext,
}

/// A stored record together with the revision it was read at.
#[derive(Debug, Clone)]
pub struct ActiveRecord {
    pub record: SignatureRecord,
    pub revision: i64,
}

impl ActiveRecord {
    pub fn from_row(row: SignatureRow) -> SigningResult<Self> {
        let revision = row.revision;
        Ok(Self {
            record: row.into_record()?,
            revision,
        })
    }
}

/// What Token preparation hands back to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPreparation {
    pub solicitud_id: SignatureId,
    pub document_hash: ContentHash,
    pub nonce: Nonce,
    pub algorithm: String,
}

/// Result of a handler call, before projection.
#[derive(Debug)]
pub struct HandlerOutcome {
    pub record: SignatureRecord,
    pub event: SignatureEvent,
    pub preparation: Option<TokenPreparation>,
}

impl HandlerOutcome {
    fn signed(record: SignatureRecord) -> Self {
        Self {
            record,
            event: SignatureEvent::Signed,
            preparation: None,
        }
    }
}

impl Attempt<'_> {
    /// Re-read the signer's active record.
    pub async fn load_active(&self) -> SigningResult<Option<ActiveRecord>> {
        self.store
            .get_active_signature(*self.document.id.as_uuid(), self.signer_id)
            .await?
            .map(ActiveRecord::from_row)
            .transpose()
    }

    /// Insert a fresh record. Losing the race to another active record is a
    /// conflict.
    async fn insert(&self, record: &SignatureRecord) -> SigningResult<()> {
        let row = SignatureRow::from_record(record, 0)?;
        match self.store.insert_signature(&row).await {
            Ok(()) => Ok(()),
            Err(MetadataError::AlreadyExists(_)) => Err(self.already_active()),
            Err(e) => Err(e.into()),
        }
    }

    /// Compare-and-swap `updated` over the row read at `previous`.
    ///
    /// Returns `false` when the stored row moved on in the meantime.
    async fn swap(&self, previous: &ActiveRecord, updated: &SignatureRecord) -> SigningResult<bool> {
        let row = SignatureRow::from_record(updated, previous.revision)?;
        Ok(self
            .store
            .update_signature(&row, previous.record.state.as_str())
            .await?)
    }

    fn already_active(&self) -> SigningError {
        SigningError::Conflict(format!(
            "signer {} already has an active signature on document {}",
            self.signer_id, self.document.id
        ))
    }
}

/// Conflict raised when the record was changed by a concurrent request.
fn lost_race(record: &SignatureRecord) -> SigningError {
    SigningError::Conflict(format!(
        "signature {} was modified concurrently",
        record.id
    ))
}

/// Conflict raised for an already signed record.
fn already_signed(record: &SignatureRecord) -> SigningError {
    SigningError::Conflict(format!(
        "signature {} is already {}",
        record.id,
        SignatureState::Signed
    ))
}
