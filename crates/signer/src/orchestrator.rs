//! Signing orchestration: the public entry point of the workflow.

use crate::error::{SigningError, SigningResult};
use crate::modality::token::Completion;
use crate::modality::{self, ActiveRecord, Attempt, HandlerOutcome, TokenPreparation};
use crate::projector::{DocumentProjector, SignatureEvent};
use crate::verifier::{IntegrityVerifier, VerificationReport};
use bytes::Bytes;
use rubrica_core::config::WorkflowConfig;
use rubrica_core::{
    CompletionPolicy, ContentHash, Document, DocumentId, DocumentState, Extra, Modality,
    RequestContext, SignatureId, SignatureRecord, SignatureState,
};
use rubrica_metadata::MetadataStore;
use rubrica_metadata::models::{DocumentRow, SignatureRow};
use rubrica_storage::ObjectStore;
use serde::Serialize;
use std::sync::Arc;

/// A signing request, one variant per modality step.
#[derive(Debug, Clone)]
pub enum SigningAction {
    Demo {
        comment: Option<String>,
    },
    Hsm {
        comment: Option<String>,
        /// Re-sign over the signer's existing HSM signature.
        resign: bool,
    },
    TokenPrepare {
        comment: Option<String>,
    },
    TokenComplete {
        solicitud_id: SignatureId,
        signature_blob: String,
        certificate_serial: Option<String>,
        external_reference: Option<String>,
        metadata: Extra,
    },
    TokenReject {
        solicitud_id: SignatureId,
        reason: Option<String>,
    },
}

impl SigningAction {
    pub fn modality(&self) -> Modality {
        match self {
            SigningAction::Demo { .. } => Modality::Demo,
            SigningAction::Hsm { .. } => Modality::Hsm,
            SigningAction::TokenPrepare { .. }
            | SigningAction::TokenComplete { .. }
            | SigningAction::TokenReject { .. } => Modality::Token,
        }
    }

    /// Short name used in logs and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            SigningAction::Demo { .. } => "demo",
            SigningAction::Hsm { .. } => "hsm",
            SigningAction::TokenPrepare { .. } => "token_prepare",
            SigningAction::TokenComplete { .. } => "token_complete",
            SigningAction::TokenReject { .. } => "token_reject",
        }
    }

    /// Whether the action creates or replaces the signer's active record,
    /// as opposed to acting on a record named by id.
    fn starts_attempt(&self) -> bool {
        matches!(
            self,
            SigningAction::Demo { .. }
                | SigningAction::Hsm { .. }
                | SigningAction::TokenPrepare { .. }
        )
    }
}

/// Result of a successful signing request.
#[derive(Debug, Clone, Serialize)]
pub struct SignatureOutcome {
    pub signature: SignatureRecord,
    /// Document state after projection.
    pub document_state: DocumentState,
    /// Present for Token preparation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preparation: Option<TokenPreparation>,
}

/// Bytes and descriptive fields of a document to register.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub bytes: Bytes,
    pub mime_type: String,
    pub case_id: Option<String>,
    pub title: Option<String>,
}

/// The signature workflow service.
pub struct SigningService {
    metadata: Arc<dyn MetadataStore>,
    storage: Arc<dyn ObjectStore>,
    projector: DocumentProjector,
    verifier: IntegrityVerifier,
    hsm_authority: String,
}

impl SigningService {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        storage: Arc<dyn ObjectStore>,
        workflow: &WorkflowConfig,
    ) -> Self {
        Self {
            projector: DocumentProjector::new(
                Arc::clone(&metadata),
                workflow.completion_policy.clone(),
            ),
            verifier: IntegrityVerifier::new(Arc::clone(&metadata), Arc::clone(&storage)),
            metadata,
            storage,
            hsm_authority: workflow.hsm_authority.clone(),
        }
    }

    pub fn completion_policy(&self) -> &CompletionPolicy {
        self.projector.policy()
    }

    pub fn hsm_authority(&self) -> &str {
        &self.hsm_authority
    }

    /// Register a document: store its bytes, then insert it in
    /// `PendingSignature`.
    pub async fn register_document(&self, new: NewDocument) -> SigningResult<Document> {
        if new.bytes.is_empty() {
            return Err(SigningError::InvalidRequest(
                "document body is empty".to_string(),
            ));
        }
        let mime_type = new.mime_type.trim();
        if mime_type.is_empty() {
            return Err(SigningError::InvalidRequest(
                "mime type is required".to_string(),
            ));
        }

        let mut document = Document::new(
            DocumentId::new(),
            ContentHash::compute(&new.bytes),
            mime_type,
            new.bytes.len() as u64,
        );
        document.case_id = non_blank(new.case_id);
        document.title = non_blank(new.title);

        if !self
            .storage
            .put_if_not_exists(&document.storage_ref, new.bytes)
            .await?
        {
            return Err(SigningError::Internal(format!(
                "storage key {} is already taken",
                document.storage_ref
            )));
        }

        if let Err(e) = self
            .metadata
            .create_document(&DocumentRow::from_document(&document))
            .await
        {
            if let Err(cleanup) = self.storage.delete(&document.storage_ref).await {
                tracing::warn!(
                    document_id = %document.id,
                    error = %cleanup,
                    "Failed to remove bytes of unregistered document"
                );
            }
            return Err(e.into());
        }

        tracing::info!(
            document_id = %document.id,
            content_hash = %document.content_hash,
            size_bytes = document.size_bytes,
            "Registered document"
        );
        Ok(document)
    }

    pub async fn get_document(&self, document_id: DocumentId) -> SigningResult<Document> {
        let row = self
            .metadata
            .get_document(*document_id.as_uuid())
            .await?
            .ok_or_else(|| SigningError::NotFound(format!("document {document_id}")))?;
        Ok(row.into_document()?)
    }

    /// Documents attached to a case, newest first.
    pub async fn list_case_documents(&self, case_id: &str) -> SigningResult<Vec<Document>> {
        let rows = self.metadata.list_documents_for_case(case_id).await?;
        Ok(rows
            .into_iter()
            .map(DocumentRow::into_document)
            .collect::<Result<Vec<_>, _>>()?)
    }

    /// Run one signing step for `signer_id` on a document.
    #[tracing::instrument(
        skip(self, action, request),
        fields(document_id = %document_id, action = action.name())
    )]
    pub async fn request_signature(
        &self,
        document_id: DocumentId,
        signer_id: &str,
        action: SigningAction,
        request: &RequestContext,
    ) -> SigningResult<SignatureOutcome> {
        let signer_id = signer_id.trim();
        if signer_id.is_empty() {
            return Err(SigningError::InvalidRequest(
                "signer id is required".to_string(),
            ));
        }

        let document = self.get_document(document_id).await?;
        let attempt = Attempt {
            store: self.metadata.as_ref(),
            document: &document,
            signer_id,
            request,
        };

        let outcome = match self.run_action(&attempt, action).await {
            Ok(outcome) => outcome,
            Err(SigningError::Conflict(msg)) => {
                self.reproject_signed(&attempt).await;
                return Err(SigningError::Conflict(msg));
            }
            Err(e) => return Err(e),
        };

        tracing::info!(
            signature_id = %outcome.record.id,
            signer_id,
            modality = %outcome.record.modality,
            state = %outcome.record.state,
            "Signature recorded"
        );

        let document_state = self
            .projector
            .on_signature_event(document.id, outcome.event)
            .await?;

        Ok(SignatureOutcome {
            signature: outcome.record,
            document_state,
            preparation: outcome.preparation,
        })
    }

    async fn run_action(
        &self,
        attempt: &Attempt<'_>,
        action: SigningAction,
    ) -> SigningResult<HandlerOutcome> {
        let active = if action.starts_attempt() {
            let active = attempt.load_active().await?;
            if let Some(active) = &active {
                check_not_signed(active, &action)?;
            }
            active
        } else {
            None
        };

        match action {
            SigningAction::Demo { comment } => {
                modality::demo::sign(attempt, active.as_ref(), comment).await
            }
            SigningAction::Hsm { comment, resign } => {
                modality::hsm::sign(attempt, active.as_ref(), &self.hsm_authority, comment, resign)
                    .await
            }
            SigningAction::TokenPrepare { comment } => {
                modality::token::prepare(attempt, active, comment).await
            }
            SigningAction::TokenComplete {
                solicitud_id,
                signature_blob,
                certificate_serial,
                external_reference,
                metadata,
            } => {
                let completion = Completion {
                    solicitud_id,
                    signature_blob,
                    certificate_serial,
                    external_reference,
                    metadata,
                };
                modality::token::complete(attempt, completion).await
            }
            SigningAction::TokenReject {
                solicitud_id,
                reason,
            } => modality::token::reject(attempt, solicitud_id, reason).await,
        }
    }

    /// Project the signer's signed record again before reporting a conflict.
    ///
    /// The signature write and the projection are separate statements, so a
    /// projection that failed after a committed signature is repaired by the
    /// signer's next request. Projection is forward-only and idempotent.
    async fn reproject_signed(&self, attempt: &Attempt<'_>) {
        let signed = match attempt.load_active().await {
            Ok(active) => active.is_some_and(|a| a.record.state == SignatureState::Signed),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to reload signature after conflict");
                return;
            }
        };
        if !signed {
            return;
        }
        if let Err(e) = self
            .projector
            .on_signature_event(attempt.document.id, SignatureEvent::Signed)
            .await
        {
            tracing::warn!(
                document_id = %attempt.document.id,
                error = %e,
                "Failed to re-project signed document"
            );
        }
    }

    pub async fn get_signature(&self, signature_id: SignatureId) -> SigningResult<SignatureRecord> {
        let row = self
            .metadata
            .get_signature(*signature_id.as_uuid())
            .await?
            .ok_or_else(|| SigningError::NotFound(format!("signature {signature_id}")))?;
        Ok(row.into_record()?)
    }

    /// Full signature history of a document, rejected attempts included.
    pub async fn list_signatures(&self, document_id: DocumentId) -> SigningResult<Vec<SignatureRecord>> {
        self.get_document(document_id).await?;
        let rows = self.metadata.list_signatures(*document_id.as_uuid()).await?;
        Ok(rows
            .into_iter()
            .map(SignatureRow::into_record)
            .collect::<Result<Vec<_>, _>>()?)
    }

    pub async fn verify(&self, document_id: DocumentId) -> SigningResult<VerificationReport> {
        self.verifier.verify(document_id).await
    }
}

/// An active signed record blocks new attempts, except an HSM re-sign over
/// the signer's own HSM record.
fn check_not_signed(active: &ActiveRecord, action: &SigningAction) -> SigningResult<()> {
    let record = &active.record;
    if record.state != SignatureState::Signed {
        return Ok(());
    }
    if let SigningAction::Hsm { resign: true, .. } = action
        && record.modality == Modality::Hsm
    {
        return Ok(());
    }
    Err(SigningError::Conflict(format!(
        "document {} is already signed by {}",
        record.document_id, record.signer_id
    )))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
