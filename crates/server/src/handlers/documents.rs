//! Document registration and lookup.

use crate::audit::{AuditAction, AuditEvent};
use crate::auth::{get_trace_id, request_context, require_scope};
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Query, Request, State};
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use rubrica_core::token::TokenScope;
use rubrica_core::{Document, DocumentId};
use rubrica_signer::NewDocument;
use serde::Deserialize;

/// Query parameters of `POST /v1/documents`.
#[derive(Debug, Default, Deserialize)]
pub struct RegisterParams {
    pub case_id: Option<String>,
    pub title: Option<String>,
}

/// Query parameters of `GET /v1/documents`.
#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub case_id: Option<String>,
}

pub(crate) fn parse_document_id(raw: &str) -> ApiResult<DocumentId> {
    DocumentId::parse(raw).map_err(|e| ApiError::BadRequest(e.to_string()))
}

/// POST /v1/documents - Register a document from the raw request body.
///
/// The `Content-Type` header becomes the document's MIME type.
pub async fn register_document(
    State(state): State<AppState>,
    Query(params): Query<RegisterParams>,
    req: Request,
) -> ApiResult<(StatusCode, Json<Document>)> {
    let auth = require_scope(&req, TokenScope::DocumentsAdmin)?;
    let ctx = request_context(&req);
    let trace_id = get_trace_id(&req).map(|t| t.0.clone());

    let mime_type = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Content-Type header is required".to_string()))?;

    let limit = usize::try_from(state.config.server.max_document_size).unwrap_or(usize::MAX);
    let bytes = axum::body::to_bytes(req.into_body(), limit)
        .await
        .map_err(|e| {
            ApiError::BadRequest(format!(
                "failed to read document body (limit {limit} bytes): {e}"
            ))
        })?;

    let document = state
        .signing
        .register_document(NewDocument {
            bytes,
            mime_type,
            case_id: params.case_id,
            title: params.title,
        })
        .await?;

    metrics::DOCUMENTS_REGISTERED.inc();
    metrics::DOCUMENT_BYTES_REGISTERED.inc_by(document.size_bytes);

    state.audit(
        AuditEvent::new(AuditAction::DocumentRegistered, auth.subject())
            .document(document.id)
            .ip(ctx.ip)
            .trace_id(trace_id)
            .detail(document.content_hash.to_hex()),
    );

    Ok((StatusCode::CREATED, Json(document)))
}

/// GET /v1/documents/{document_id}
pub async fn get_document(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
    req: Request,
) -> ApiResult<Json<Document>> {
    require_scope(&req, TokenScope::DocumentsRead)?;
    let document_id = parse_document_id(&document_id)?;
    Ok(Json(state.signing.get_document(document_id).await?))
}

/// GET /v1/documents?case_id= - Documents of one case, newest first.
pub async fn list_documents(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
    req: Request,
) -> ApiResult<Json<Vec<Document>>> {
    require_scope(&req, TokenScope::DocumentsRead)?;
    let case_id = params
        .case_id
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ApiError::BadRequest("case_id query parameter is required".to_string()))?;
    Ok(Json(state.signing.list_case_documents(case_id).await?))
}
