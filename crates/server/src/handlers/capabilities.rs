//! Capability discovery endpoint.

use crate::error::ApiResult;
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use rubrica_core::{CompletionPolicy, SIGNATURE_HASH_ALGORITHM};
use serde::Serialize;

/// Capabilities response.
#[derive(Debug, Serialize)]
pub struct CapabilitiesResponse {
    /// Signing modalities accepted by this server.
    pub modalities: Vec<&'static str>,
    /// Hash algorithm Token clients must sign.
    pub hash_algorithm: &'static str,
    /// Largest accepted document in bytes.
    pub max_document_size: u64,
    pub completion_policy: CompletionPolicy,
    /// Certificate serial stamped on HSM signatures.
    pub hsm_authority: String,
    pub api_version: &'static str,
}

/// GET /v1/capabilities
pub async fn get_capabilities(
    State(state): State<AppState>,
) -> ApiResult<Json<CapabilitiesResponse>> {
    Ok(Json(CapabilitiesResponse {
        modalities: vec!["demo", "hsm", "token"],
        hash_algorithm: SIGNATURE_HASH_ALGORITHM,
        max_document_size: state.config.server.max_document_size,
        completion_policy: state.signing.completion_policy().clone(),
        hsm_authority: state.signing.hsm_authority().to_string(),
        api_version: "v1",
    }))
}
