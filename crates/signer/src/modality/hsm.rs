//! HSM modality: single-phase simulated hardware signature.

use super::{ActiveRecord, Attempt, HandlerOutcome};
use crate::blob::hsm_blob;
use crate::error::{SigningError, SigningResult};
use rubrica_core::{
    HsmHistoryEntry, Modality, SignatureMetadata, SignatureRecord, SignatureState,
};
use time::OffsetDateTime;

/// Sign through the simulated HSM.
///
/// Reuses the signer's own HSM record when one is active (pending, or signed
/// with `resign`), keeping its id and pinned hash and pushing the superseded
/// signature onto the metadata history. Never touches records of another
/// modality.
pub async fn sign(
    attempt: &Attempt<'_>,
    active: Option<&ActiveRecord>,
    authority: &str,
    comment: Option<String>,
    resign: bool,
) -> SigningResult<HandlerOutcome> {
    let now = OffsetDateTime::now_utc();

    let Some(active) = active else {
        let document = attempt.document;
        let record = SignatureRecord::signed(
            document.id,
            attempt.signer_id,
            Modality::Hsm,
            document.content_hash,
            hsm_blob(&document.content_hash, now)?,
            now,
            SignatureMetadata::hsm(authority, attempt.request),
        )
        .with_comment(comment)
        .with_certificate_serial(Some(authority.to_string()));
        attempt.insert(&record).await?;
        return Ok(HandlerOutcome::signed(record));
    };

    let previous = &active.record;
    if previous.modality != Modality::Hsm {
        return Err(SigningError::Conflict(format!(
            "signer {} has an active {} signature on document {}",
            attempt.signer_id, previous.modality, previous.document_id
        )));
    }
    if previous.state == SignatureState::Signed && !resign {
        return Err(super::already_signed(previous));
    }

    let superseded = HsmHistoryEntry {
        signed_at: previous.signed_at,
        signature_blob: previous
            .signature_blob
            .as_ref()
            .map(|b| b.as_str().to_string()),
        certificate_serial: previous.certificate_serial.clone(),
    };

    let mut updated = previous.clone();
    // The blob is anchored to the hash pinned when the record was created.
    updated.signature_blob = Some(hsm_blob(&previous.document_hash_at_request, now)?);
    updated.state = SignatureState::Signed;
    updated.signed_at = Some(now);
    updated.updated_at = now;
    updated.valid = true;
    updated.certificate_serial = Some(authority.to_string());
    updated.metadata = previous
        .metadata
        .hsm_resigned(authority, superseded, attempt.request);
    if comment.is_some() {
        updated.comment = comment;
    }

    if !attempt.swap(active, &updated).await? {
        return Err(super::lost_race(previous));
    }

    tracing::info!(
        signature_id = %updated.id,
        signer_id = attempt.signer_id,
        "Re-signed HSM signature in place"
    );
    Ok(HandlerOutcome::signed(updated))
}
