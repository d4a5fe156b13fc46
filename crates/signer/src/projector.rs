//! Document state projection.
//!
//! Derives the coarse document state from signature events. The store only
//! ever moves the state forward, so concurrent projections are safe in any
//! order.

use crate::error::{SigningError, SigningResult};
use rubrica_core::{CompletionPolicy, DocumentId, DocumentState};
use rubrica_metadata::MetadataStore;
use std::sync::Arc;
use time::OffsetDateTime;

/// What a modality handler just did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureEvent {
    /// A Token flow was prepared or re-prepared.
    Prepared,
    /// A record reached `Signed`.
    Signed,
    /// A Token flow was rejected.
    Rejected,
}

/// Advances document state after signature events.
pub struct DocumentProjector {
    metadata: Arc<dyn MetadataStore>,
    policy: CompletionPolicy,
}

impl DocumentProjector {
    pub fn new(metadata: Arc<dyn MetadataStore>, policy: CompletionPolicy) -> Self {
        Self { metadata, policy }
    }

    pub fn policy(&self) -> &CompletionPolicy {
        &self.policy
    }

    /// Apply `event` and return the resulting document state.
    pub async fn on_signature_event(
        &self,
        document_id: DocumentId,
        event: SignatureEvent,
    ) -> SigningResult<DocumentState> {
        let target = match event {
            SignatureEvent::Prepared => Some(DocumentState::InSigning),
            SignatureEvent::Signed => Some(self.target_after_signing(document_id).await?),
            SignatureEvent::Rejected => None,
        };

        if let Some(target) = target {
            let advanced = self
                .metadata
                .advance_document_state(*document_id.as_uuid(), target, OffsetDateTime::now_utc())
                .await?;
            if advanced {
                tracing::info!(
                    document_id = %document_id,
                    state = %target,
                    "Document state advanced"
                );
            }
        }

        self.current_state(document_id).await
    }

    async fn target_after_signing(&self, document_id: DocumentId) -> SigningResult<DocumentState> {
        let signed = self
            .metadata
            .list_signed_signatures(*document_id.as_uuid())
            .await?;
        let satisfied = self
            .policy
            .is_satisfied(signed.iter().map(|row| row.signer_id.as_str()));
        Ok(if satisfied {
            DocumentState::Signed
        } else {
            DocumentState::InSigning
        })
    }

    async fn current_state(&self, document_id: DocumentId) -> SigningResult<DocumentState> {
        let row = self
            .metadata
            .get_document(*document_id.as_uuid())
            .await?
            .ok_or_else(|| SigningError::NotFound(format!("document {document_id}")))?;
        DocumentState::parse(&row.state).map_err(|e| SigningError::Internal(e.to_string()))
    }
}
