//! Authentication-related endpoints.

use crate::auth::require_auth;
use crate::error::{ApiError, ApiResult};
use axum::Json;
use axum::extract::Request;
use serde::Serialize;
use time::format_description::well_known::Rfc3339;

/// Response for the authenticated caller.
#[derive(Debug, Serialize)]
pub struct WhoamiResponse {
    pub token_id: String,
    /// Signer identity used for every signing request made with this token.
    pub subject: String,
    pub scopes: Vec<String>,
    pub expires_at: Option<String>,
    pub description: Option<String>,
}

/// GET /v1/auth/whoami - Return the token identity.
pub async fn whoami(req: Request) -> ApiResult<Json<WhoamiResponse>> {
    let auth = require_auth(&req)?;
    let token = &auth.token;

    let mut scopes: Vec<String> = token
        .scopes
        .iter()
        .map(|s| s.as_str().to_string())
        .collect();
    scopes.sort();

    let expires_at = match token.expires_at {
        Some(ts) => Some(
            ts.format(&Rfc3339)
                .map_err(|e| ApiError::Internal(format!("failed to format expires_at: {e}")))?,
        ),
        None => None,
    };

    Ok(Json(WhoamiResponse {
        token_id: token.id.to_string(),
        subject: token.subject.clone(),
        scopes,
        expires_at,
        description: token.description.clone(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthenticatedUser;
    use axum::body::Body;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use rubrica_core::token::{Token, TokenId, TokenScope};
    use std::collections::HashSet;
    use time::OffsetDateTime;

    #[tokio::test]
    async fn test_whoami_reports_subject_and_sorted_scopes() {
        let now = OffsetDateTime::now_utc();
        let expires_at = now + time::Duration::seconds(3600);
        let scopes: HashSet<TokenScope> = [TokenScope::DocumentsSign, TokenScope::DocumentsRead]
            .into_iter()
            .collect();
        let token = Token {
            id: TokenId::new(),
            subject: "judge-7".to_string(),
            scopes,
            expires_at: Some(expires_at),
            revoked_at: None,
            created_at: now,
            description: Some("chamber 3".to_string()),
        };

        let mut req = Request::new(Body::empty());
        req.extensions_mut().insert(AuthenticatedUser {
            token: token.clone(),
        });

        let Json(response) = whoami(req).await.unwrap();
        assert_eq!(response.token_id, token.id.to_string());
        assert_eq!(response.subject, "judge-7");
        assert_eq!(
            response.scopes,
            vec!["documents:read".to_string(), "documents:sign".to_string()]
        );
        assert_eq!(
            response.expires_at,
            Some(expires_at.format(&Rfc3339).unwrap())
        );
    }

    #[tokio::test]
    async fn test_whoami_requires_token() {
        let err = whoami(Request::new(Body::empty())).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::UNAUTHORIZED);
    }
}
