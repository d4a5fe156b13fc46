//! Token modality: two-phase signature completed by the client.
//!
//! Prepare pins the document hash and issues a nonce. The client signs
//! outside this service and completes with an opaque blob, or rejects the
//! attempt so a new one can start.

use super::{ActiveRecord, Attempt, HandlerOutcome, TokenPreparation};
use crate::error::{SigningError, SigningResult};
use crate::projector::SignatureEvent;
use rubrica_core::{
    ExternalReference, Extra, Modality, Nonce, SIGNATURE_HASH_ALGORITHM, SignatureBlob,
    SignatureId, SignatureMetadata, SignatureRecord, SignatureState,
};
use rubrica_metadata::MetadataError;
use rubrica_metadata::models::SignatureRow;
use time::OffsetDateTime;

/// Bound on insert/re-read/swap rounds when concurrent prepares collide.
const PREPARE_ATTEMPTS: usize = 4;

/// Client-supplied completion of a prepared record.
#[derive(Debug, Clone, Default)]
pub struct Completion {
    pub solicitud_id: SignatureId,
    pub signature_blob: String,
    pub certificate_serial: Option<String>,
    pub external_reference: Option<String>,
    pub metadata: Extra,
}

/// Prepare, or re-prepare in place, the signer's Token record.
///
/// Concurrent prepares for the same signer converge on one record: the
/// loser of the insert race re-reads the winner's row and re-prepares it.
pub async fn prepare(
    attempt: &Attempt<'_>,
    active: Option<ActiveRecord>,
    comment: Option<String>,
) -> SigningResult<HandlerOutcome> {
    let mut active = active;

    for _ in 0..PREPARE_ATTEMPTS {
        let Some(current) = active.take() else {
            let document = attempt.document;
            let record = SignatureRecord::pending(
                document.id,
                attempt.signer_id,
                Modality::Token,
                document.content_hash,
                SignatureMetadata::token_preparation(Nonce::generate()),
            )
            .with_comment(comment.clone());

            let row = SignatureRow::from_record(&record, 0)?;
            match attempt.store.insert_signature(&row).await {
                Ok(()) => return prepared(record),
                Err(MetadataError::AlreadyExists(_)) => {
                    tracing::debug!(
                        document_id = %document.id,
                        signer_id = attempt.signer_id,
                        "Token prepare lost insert race, re-reading"
                    );
                    active = attempt.load_active().await?;
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        };

        let previous = &current.record;
        if previous.state == SignatureState::Signed {
            return Err(super::already_signed(previous));
        }
        if previous.modality != Modality::Token {
            return Err(SigningError::Conflict(format!(
                "signer {} has a pending {} signature on document {}",
                attempt.signer_id, previous.modality, previous.document_id
            )));
        }

        let mut updated = previous.clone();
        updated.metadata = previous.metadata.reprepared(Nonce::generate());
        updated.updated_at = OffsetDateTime::now_utc();
        if comment.is_some() {
            updated.comment = comment.clone();
        }

        if attempt.swap(&current, &updated).await? {
            return prepared(updated);
        }
        active = attempt.load_active().await?;
    }

    Err(SigningError::Conflict(format!(
        "token preparation for signer {} on document {} kept racing",
        attempt.signer_id, attempt.document.id
    )))
}

fn prepared(record: SignatureRecord) -> SigningResult<HandlerOutcome> {
    let nonce = record.metadata.nonce().cloned().ok_or_else(|| {
        SigningError::Internal(format!("prepared signature {} lost its nonce", record.id))
    })?;
    let preparation = TokenPreparation {
        solicitud_id: record.id,
        document_hash: record.document_hash_at_request,
        nonce,
        algorithm: SIGNATURE_HASH_ALGORITHM.to_string(),
    };
    Ok(HandlerOutcome {
        record,
        event: SignatureEvent::Prepared,
        preparation: Some(preparation),
    })
}

/// Load the record named by `solicitud_id`, which must be this signer's
/// Token record on this document.
async fn own_record(attempt: &Attempt<'_>, solicitud_id: SignatureId) -> SigningResult<ActiveRecord> {
    let not_found = || {
        SigningError::NotFound(format!(
            "token signature {solicitud_id} for signer {} on document {}",
            attempt.signer_id, attempt.document.id
        ))
    };

    let row = attempt
        .store
        .get_signature(*solicitud_id.as_uuid())
        .await?
        .ok_or_else(not_found)?;
    let found = ActiveRecord::from_row(row)?;
    let record = &found.record;
    if record.document_id != attempt.document.id
        || record.signer_id != attempt.signer_id
        || record.modality != Modality::Token
    {
        return Err(not_found());
    }
    Ok(found)
}

fn ensure_pending(record: &SignatureRecord) -> SigningResult<()> {
    match record.state {
        SignatureState::Pending => Ok(()),
        SignatureState::Signed => Err(super::already_signed(record)),
        SignatureState::Rejected => Err(SigningError::Conflict(format!(
            "signature {} was rejected",
            record.id
        ))),
    }
}

/// After a failed swap, report what the other writer did.
async fn swap_conflict(attempt: &Attempt<'_>, record: &SignatureRecord) -> SigningError {
    match own_record(attempt, record.id).await {
        Ok(current) => match ensure_pending(&current.record) {
            Err(e) => e,
            Ok(()) => super::lost_race(record),
        },
        Err(e) => e,
    }
}

/// Complete a prepared record with the client's signature blob.
///
/// The request is validated before the record is looked up, so a malformed
/// completion is invalid whatever state the record is in.
pub async fn complete(attempt: &Attempt<'_>, completion: Completion) -> SigningResult<HandlerOutcome> {
    let blob = SignatureBlob::parse(&completion.signature_blob)
        .map_err(|e| SigningError::InvalidRequest(e.to_string()))?;
    let external_reference = match completion.external_reference.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => ExternalReference::parse(s)
            .map_err(|e| SigningError::InvalidRequest(e.to_string()))?,
        _ => ExternalReference::generate(),
    };
    let certificate_serial = completion
        .certificate_serial
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let current = own_record(attempt, completion.solicitud_id).await?;
    let previous = &current.record;
    ensure_pending(previous)?;

    let now = OffsetDateTime::now_utc();
    let mut updated = previous.clone();
    updated.state = SignatureState::Signed;
    updated.signature_blob = Some(blob);
    updated.signed_at = Some(now);
    updated.updated_at = now;
    updated.valid = true;
    updated.external_reference = Some(external_reference);
    if certificate_serial.is_some() {
        updated.certificate_serial = certificate_serial;
    }
    updated.metadata = previous
        .metadata
        .completed(attempt.request, completion.metadata)
        .map_err(|e| SigningError::Internal(e.to_string()))?;

    if !attempt.swap(&current, &updated).await? {
        return Err(swap_conflict(attempt, previous).await);
    }
    Ok(HandlerOutcome::signed(updated))
}

/// Abandon a prepared record. The signer may start over afterwards.
pub async fn reject(
    attempt: &Attempt<'_>,
    solicitud_id: SignatureId,
    reason: Option<String>,
) -> SigningResult<HandlerOutcome> {
    let current = own_record(attempt, solicitud_id).await?;
    let previous = &current.record;
    ensure_pending(previous)?;

    let mut updated = previous.clone();
    updated.state = SignatureState::Rejected;
    updated.updated_at = OffsetDateTime::now_utc();
    updated.valid = false;
    updated.metadata = previous.metadata.rejected(reason);

    if !attempt.swap(&current, &updated).await? {
        return Err(swap_conflict(attempt, previous).await);
    }
    Ok(HandlerOutcome {
        record: updated,
        event: SignatureEvent::Rejected,
        preparation: None,
    })
}
