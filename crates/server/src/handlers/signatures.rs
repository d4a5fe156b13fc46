//! Signing, history and verification endpoints.
//!
//! The signer id is always the authenticated token's subject; request bodies
//! cannot sign on behalf of someone else.

use crate::audit::{AuditAction, AuditEvent};
use crate::auth::{get_trace_id, request_context, require_scope};
use crate::error::{ApiError, ApiResult};
use crate::handlers::documents::parse_document_id;
use crate::metrics;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Request, State};
use rubrica_core::token::TokenScope;
use rubrica_core::{DocumentId, Extra, SignatureId, SignatureRecord};
use rubrica_signer::{SignatureOutcome, SigningAction, SigningError, VerificationReport};
use serde::Deserialize;
use serde::de::DeserializeOwned;

/// Maximum request body size for signing endpoints (1 MiB).
const MAX_SIGNING_BODY_SIZE: usize = 1024 * 1024;

/// Body of the Demo signing endpoint. May be omitted.
#[derive(Debug, Default, Deserialize)]
pub struct DemoSignRequest {
    pub comment: Option<String>,
}

/// Body of the HSM signing endpoint. May be omitted.
#[derive(Debug, Default, Deserialize)]
pub struct HsmSignRequest {
    pub comment: Option<String>,
    /// Replace the caller's existing HSM signature.
    #[serde(default)]
    pub resign: bool,
}

/// Body of the Token prepare endpoint. May be omitted.
#[derive(Debug, Default, Deserialize)]
pub struct TokenPrepareRequest {
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TokenCompleteRequest {
    pub solicitud_id: String,
    pub signature_blob: String,
    pub certificate_serial: Option<String>,
    pub external_reference: Option<String>,
    #[serde(default)]
    pub metadata: Extra,
}

#[derive(Debug, Deserialize)]
pub struct TokenRejectRequest {
    pub solicitud_id: String,
    pub reason: Option<String>,
}

/// Read a JSON body. An empty body deserializes as `T::default()` when
/// `empty` is given.
async fn read_body<T: DeserializeOwned>(req: Request, empty: Option<T>) -> ApiResult<T> {
    let bytes = axum::body::to_bytes(req.into_body(), MAX_SIGNING_BODY_SIZE)
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read body: {e}")))?;
    if bytes.iter().all(u8::is_ascii_whitespace)
        && let Some(default) = empty
    {
        return Ok(default);
    }
    serde_json::from_slice(&bytes).map_err(|e| ApiError::BadRequest(format!("invalid JSON: {e}")))
}

fn parse_solicitud_id(raw: &str) -> ApiResult<SignatureId> {
    SignatureId::parse(raw.trim()).map_err(|e| ApiError::BadRequest(e.to_string()))
}

fn audit_action(action: &SigningAction) -> AuditAction {
    match action {
        SigningAction::Demo { .. } => AuditAction::SignatureDemo,
        SigningAction::Hsm { .. } => AuditAction::SignatureHsm,
        SigningAction::TokenPrepare { .. } => AuditAction::TokenPrepared,
        SigningAction::TokenComplete { .. } => AuditAction::TokenCompleted,
        SigningAction::TokenReject { .. } => AuditAction::TokenRejected,
    }
}

/// Authorize, run one signing action, then count and audit the outcome.
async fn run_signing<F>(
    state: AppState,
    document_id: String,
    req: Request,
    empty: Option<F>,
    to_action: impl FnOnce(F) -> ApiResult<SigningAction>,
) -> ApiResult<Json<SignatureOutcome>>
where
    F: DeserializeOwned,
{
    let auth = require_scope(&req, TokenScope::DocumentsSign)?;
    let document_id: DocumentId = parse_document_id(&document_id)?;
    let ctx = request_context(&req);
    let trace_id = get_trace_id(&req).map(|t| t.0.clone());

    let body = read_body(req, empty).await?;
    let action = to_action(body)?;
    let action_name = action.name();
    let audit = audit_action(&action);

    let result = state
        .signing
        .request_signature(document_id, auth.subject(), action, &ctx)
        .await;

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(err) => {
            if matches!(err, SigningError::Conflict(_)) {
                metrics::SIGNATURE_CONFLICTS.inc();
            }
            metrics::record_signature(action_name, err.kind().as_str());
            return Err(err.into());
        }
    };
    metrics::record_signature(action_name, "ok");

    state.audit(
        AuditEvent::new(audit, auth.subject())
            .document(document_id)
            .signature(outcome.signature.id)
            .ip(ctx.ip)
            .trace_id(trace_id)
            .detail(outcome.document_state.as_str()),
    );

    Ok(Json(outcome))
}

/// POST /v1/documents/{document_id}/signatures/demo
pub async fn sign_demo(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
    req: Request,
) -> ApiResult<Json<SignatureOutcome>> {
    run_signing(
        state,
        document_id,
        req,
        Some(DemoSignRequest::default()),
        |body: DemoSignRequest| {
            Ok(SigningAction::Demo {
                comment: body.comment,
            })
        },
    )
    .await
}

/// POST /v1/documents/{document_id}/signatures/hsm
pub async fn sign_hsm(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
    req: Request,
) -> ApiResult<Json<SignatureOutcome>> {
    run_signing(
        state,
        document_id,
        req,
        Some(HsmSignRequest::default()),
        |body: HsmSignRequest| {
            Ok(SigningAction::Hsm {
                comment: body.comment,
                resign: body.resign,
            })
        },
    )
    .await
}

/// POST /v1/documents/{document_id}/signatures/token/prepare
pub async fn prepare_token(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
    req: Request,
) -> ApiResult<Json<SignatureOutcome>> {
    run_signing(
        state,
        document_id,
        req,
        Some(TokenPrepareRequest::default()),
        |body: TokenPrepareRequest| {
            Ok(SigningAction::TokenPrepare {
                comment: body.comment,
            })
        },
    )
    .await
}

/// POST /v1/documents/{document_id}/signatures/token/complete
pub async fn complete_token(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
    req: Request,
) -> ApiResult<Json<SignatureOutcome>> {
    run_signing(
        state,
        document_id,
        req,
        None,
        |body: TokenCompleteRequest| {
            Ok(SigningAction::TokenComplete {
                solicitud_id: parse_solicitud_id(&body.solicitud_id)?,
                signature_blob: body.signature_blob,
                certificate_serial: body.certificate_serial,
                external_reference: body.external_reference,
                metadata: body.metadata,
            })
        },
    )
    .await
}

/// POST /v1/documents/{document_id}/signatures/token/reject
pub async fn reject_token(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
    req: Request,
) -> ApiResult<Json<SignatureOutcome>> {
    run_signing(
        state,
        document_id,
        req,
        None,
        |body: TokenRejectRequest| {
            Ok(SigningAction::TokenReject {
                solicitud_id: parse_solicitud_id(&body.solicitud_id)?,
                reason: body.reason,
            })
        },
    )
    .await
}

/// GET /v1/documents/{document_id}/signatures - Full history.
pub async fn list_signatures(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
    req: Request,
) -> ApiResult<Json<Vec<SignatureRecord>>> {
    require_scope(&req, TokenScope::DocumentsRead)?;
    let document_id = parse_document_id(&document_id)?;
    Ok(Json(state.signing.list_signatures(document_id).await?))
}

/// GET /v1/signatures/{signature_id}
pub async fn get_signature(
    State(state): State<AppState>,
    Path(signature_id): Path<String>,
    req: Request,
) -> ApiResult<Json<SignatureRecord>> {
    require_scope(&req, TokenScope::DocumentsRead)?;
    let signature_id =
        SignatureId::parse(&signature_id).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    Ok(Json(state.signing.get_signature(signature_id).await?))
}

/// GET /v1/documents/{document_id}/verify
#[tracing::instrument(skip(state, req))]
pub async fn verify_document(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
    req: Request,
) -> ApiResult<Json<VerificationReport>> {
    require_scope(&req, TokenScope::DocumentsRead)?;
    let document_id = parse_document_id(&document_id)?;
    let report = state.signing.verify(document_id).await?;

    let result = if report.read_error.is_some() {
        "unreadable"
    } else if report.integrity_ok {
        "intact"
    } else {
        "mismatch"
    };
    metrics::record_verification(result);
    if !report.integrity_ok || !report.drifted_signatures.is_empty() {
        tracing::warn!(
            document_id = %document_id,
            result,
            drifted = report.drifted_signatures.len(),
            "Document failed integrity verification"
        );
    }

    Ok(Json(report))
}
