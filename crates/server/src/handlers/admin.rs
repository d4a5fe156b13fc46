//! Administrative endpoints.

use crate::audit::{AuditAction, AuditEvent};
use crate::auth::{get_trace_id, hash_token, require_scope};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use rubrica_core::token::{CreateTokenRequest, CreateTokenResponse, TokenScope};
use rubrica_metadata::models::TokenRow;
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

/// Maximum request body size for admin endpoints (1 MiB).
const MAX_ADMIN_BODY_SIZE: usize = 1024 * 1024;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// GET /v1/health - Health check.
///
/// Unauthenticated so load balancers and health checkers can call it. Returns only
/// status and version.
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    state.metadata.health_check().await?;
    state.storage.health_check().await?;

    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    }))
}

/// Token listing entry. Never includes the secret or its hash.
#[derive(Debug, Serialize)]
pub struct TokenInfo {
    pub token_id: String,
    pub subject: String,
    pub scopes: Vec<String>,
    pub expires_at: Option<String>,
    pub revoked_at: Option<String>,
    pub created_at: String,
    pub last_used_at: Option<String>,
    pub description: Option<String>,
}

fn format_ts(ts: OffsetDateTime, field: &str) -> ApiResult<String> {
    ts.format(&Rfc3339)
        .map_err(|e| ApiError::Internal(format!("failed to format {field}: {e}")))
}

fn format_opt_ts(ts: Option<OffsetDateTime>, field: &str) -> ApiResult<Option<String>> {
    ts.map(|t| format_ts(t, field)).transpose()
}

impl TryFrom<TokenRow> for TokenInfo {
    type Error = ApiError;

    fn try_from(token: TokenRow) -> ApiResult<Self> {
        let scopes: Vec<String> = serde_json::from_str(&token.scopes)
            .map_err(|e| ApiError::Internal(format!("invalid token scopes: {e}")))?;
        Ok(Self {
            token_id: token.token_id.to_string(),
            subject: token.subject,
            scopes,
            expires_at: format_opt_ts(token.expires_at, "expires_at")?,
            revoked_at: format_opt_ts(token.revoked_at, "revoked_at")?,
            created_at: format_ts(token.created_at, "created_at")?,
            last_used_at: format_opt_ts(token.last_used_at, "last_used_at")?,
            description: token.description,
        })
    }
}

/// POST /v1/admin/tokens - Create a new token.
pub async fn create_token(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<(StatusCode, Json<CreateTokenResponse>)> {
    let auth = require_scope(&req, TokenScope::DocumentsAdmin)?;
    let trace_id = get_trace_id(&req).map(|t| t.0.clone());

    let body: CreateTokenRequest = {
        let bytes = axum::body::to_bytes(req.into_body(), MAX_ADMIN_BODY_SIZE)
            .await
            .map_err(|e| ApiError::BadRequest(format!("failed to read body: {e}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| ApiError::BadRequest(format!("invalid JSON: {e}")))?
    };

    let subject = body.subject.trim().to_string();
    if subject.is_empty() {
        return Err(ApiError::BadRequest("subject cannot be empty".to_string()));
    }
    if body.scopes.is_empty() {
        return Err(ApiError::BadRequest(
            "at least one scope is required".to_string(),
        ));
    }
    for scope in &body.scopes {
        TokenScope::parse(scope)
            .map_err(|_| ApiError::BadRequest(format!("invalid scope: {scope}")))?;
    }

    let token_secret = generate_token_secret();
    let token_hash = hash_token(&token_secret);

    let now = OffsetDateTime::now_utc();
    let expires_at = match body.expires_in {
        Some(secs) => {
            let secs_i64: i64 = secs.try_into().map_err(|_| {
                ApiError::BadRequest(format!("expires_in too large: {secs}"))
            })?;
            Some(now + time::Duration::seconds(secs_i64))
        }
        None => None,
    };

    let scopes_json = serde_json::to_string(&body.scopes)
        .map_err(|e| ApiError::Internal(format!("failed to serialize scopes: {e}")))?;

    let token_row = TokenRow {
        token_id: Uuid::new_v4(),
        subject: subject.clone(),
        token_hash,
        scopes: scopes_json,
        expires_at,
        revoked_at: None,
        created_at: now,
        last_used_at: None,
        description: body.description,
    };
    state.metadata.create_token(&token_row).await?;

    tracing::info!(
        token_id = %token_row.token_id,
        subject = %subject,
        scopes = ?body.scopes,
        "Token created"
    );
    state.audit(
        AuditEvent::new(AuditAction::TokenCreated, auth.subject())
            .trace_id(trace_id)
            .detail(format!("{} for {subject}", token_row.token_id)),
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateTokenResponse {
            token_id: token_row.token_id.to_string(),
            token_secret,
            subject,
            expires_at: format_opt_ts(expires_at, "expires_at")?,
        }),
    ))
}

/// GET /v1/admin/tokens - List tokens.
pub async fn list_tokens(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<Vec<TokenInfo>>> {
    require_scope(&req, TokenScope::DocumentsAdmin)?;

    let tokens = state.metadata.list_tokens(None).await?;
    let infos = tokens
        .into_iter()
        .map(TokenInfo::try_from)
        .collect::<ApiResult<Vec<_>>>()?;
    Ok(Json(infos))
}

/// DELETE /v1/admin/tokens/{token_id} - Revoke a token.
pub async fn revoke_token(
    State(state): State<AppState>,
    Path(token_id): Path<String>,
    req: Request,
) -> ApiResult<StatusCode> {
    let auth = require_scope(&req, TokenScope::DocumentsAdmin)?;
    let trace_id = get_trace_id(&req).map(|t| t.0.clone());

    let token_id = Uuid::parse_str(&token_id)
        .map_err(|e| ApiError::BadRequest(format!("invalid token ID: {e}")))?;

    let token = state
        .metadata
        .get_token(token_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("token not found".to_string()))?;
    if token.revoked_at.is_some() {
        return Ok(StatusCode::NO_CONTENT);
    }

    state
        .metadata
        .revoke_token(token_id, OffsetDateTime::now_utc())
        .await?;

    tracing::info!(token_id = %token_id, subject = %token.subject, "Token revoked");
    state.audit(
        AuditEvent::new(AuditAction::TokenRevoked, auth.subject())
            .trace_id(trace_id)
            .detail(token_id.to_string()),
    );

    Ok(StatusCode::NO_CONTENT)
}

/// 32 random bytes, URL-safe base64 without padding.
fn generate_token_secret() -> String {
    use base64::Engine;
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}
