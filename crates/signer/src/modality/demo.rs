//! Demo modality: immediate, locally generated signature.

use super::{ActiveRecord, Attempt, HandlerOutcome};
use crate::blob::demo_blob;
use crate::error::SigningResult;
use rubrica_core::{Modality, SignatureMetadata, SignatureRecord, SignatureState};
use rubrica_metadata::MetadataError;
use rubrica_metadata::models::SignatureRow;
use time::OffsetDateTime;

/// Sign the document immediately.
///
/// A pending record left by an abandoned flow of any modality is discarded in
/// the same transaction that inserts the signed record.
pub async fn sign(
    attempt: &Attempt<'_>,
    active: Option<&ActiveRecord>,
    comment: Option<String>,
) -> SigningResult<HandlerOutcome> {
    if let Some(active) = active
        && active.record.state == SignatureState::Signed
    {
        return Err(super::already_signed(&active.record));
    }

    let document = attempt.document;
    let now = OffsetDateTime::now_utc();
    let blob = demo_blob(&document.id, &document.content_hash, attempt.signer_id, now)?;
    let record = SignatureRecord::signed(
        document.id,
        attempt.signer_id,
        Modality::Demo,
        document.content_hash,
        blob,
        now,
        SignatureMetadata::demo(attempt.request),
    )
    .with_comment(comment);

    let row = SignatureRow::from_record(&record, 0)?;
    let discarded = match attempt.store.insert_signature_discarding_pending(&row).await {
        Ok(n) => n,
        Err(MetadataError::AlreadyExists(_)) => return Err(attempt.already_active()),
        Err(e) => return Err(e.into()),
    };
    if discarded > 0 {
        tracing::info!(
            document_id = %document.id,
            signer_id = attempt.signer_id,
            discarded,
            "Discarded pending signature superseded by demo signature"
        );
    }

    Ok(HandlerOutcome::signed(record))
}
