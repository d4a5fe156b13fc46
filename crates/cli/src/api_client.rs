use anyhow::{Context, Result};
use reqwest::Url;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

pub use rubrica_core::token::{CreateTokenRequest, CreateTokenResponse};

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    token: String,
}

impl ApiClient {
    pub fn new(base_url: &str, token: &str) -> Result<Self> {
        let base_url = Url::parse(base_url).context("invalid server URL")?;
        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            token: token.to_string(),
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).context("failed to build API URL")
    }

    async fn send_json<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder) -> Result<T> {
        let response = req.bearer_auth(&self.token).send().await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!("API error ({}): {}", status, body);
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn send_empty(&self, req: reqwest::RequestBuilder) -> Result<()> {
        let response = req.bearer_auth(&self.token).send().await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!("API error ({}): {}", status, body);
        }
        Ok(())
    }

    pub async fn register_document(
        &self,
        bytes: Vec<u8>,
        mime_type: &str,
        case_id: Option<&str>,
        title: Option<&str>,
    ) -> Result<DocumentResponse> {
        let mut url = self.url("/v1/documents")?;
        if let Some(case_id) = case_id {
            url.query_pairs_mut().append_pair("case_id", case_id);
        }
        if let Some(title) = title {
            url.query_pairs_mut().append_pair("title", title);
        }
        let req = self
            .http
            .post(url)
            .header(CONTENT_TYPE, mime_type)
            .body(bytes);
        self.send_json(req).await
    }

    pub async fn get_document(&self, id: &str) -> Result<DocumentResponse> {
        let url = self.url(&format!("/v1/documents/{id}"))?;
        self.send_json(self.http.get(url)).await
    }

    pub async fn list_documents(&self, case_id: &str) -> Result<Vec<DocumentResponse>> {
        let mut url = self.url("/v1/documents")?;
        url.query_pairs_mut().append_pair("case_id", case_id);
        self.send_json(self.http.get(url)).await
    }

    pub async fn list_signatures(&self, document_id: &str) -> Result<Vec<SignatureResponse>> {
        let url = self.url(&format!("/v1/documents/{document_id}/signatures"))?;
        self.send_json(self.http.get(url)).await
    }

    pub async fn get_signature(&self, id: &str) -> Result<SignatureResponse> {
        let url = self.url(&format!("/v1/signatures/{id}"))?;
        self.send_json(self.http.get(url)).await
    }

    pub async fn verify_document(&self, document_id: &str) -> Result<VerificationResponse> {
        let url = self.url(&format!("/v1/documents/{document_id}/verify"))?;
        self.send_json(self.http.get(url)).await
    }

    pub async fn sign_demo(
        &self,
        document_id: &str,
        req: DemoSignRequest,
    ) -> Result<SignatureOutcomeResponse> {
        let url = self.url(&format!("/v1/documents/{document_id}/signatures/demo"))?;
        self.send_json(self.http.post(url).json(&req)).await
    }

    pub async fn sign_hsm(
        &self,
        document_id: &str,
        req: HsmSignRequest,
    ) -> Result<SignatureOutcomeResponse> {
        let url = self.url(&format!("/v1/documents/{document_id}/signatures/hsm"))?;
        self.send_json(self.http.post(url).json(&req)).await
    }

    pub async fn prepare_token(
        &self,
        document_id: &str,
        req: TokenPrepareRequest,
    ) -> Result<SignatureOutcomeResponse> {
        let url = self.url(&format!(
            "/v1/documents/{document_id}/signatures/token/prepare"
        ))?;
        self.send_json(self.http.post(url).json(&req)).await
    }

    pub async fn complete_token(
        &self,
        document_id: &str,
        req: TokenCompleteRequest,
    ) -> Result<SignatureOutcomeResponse> {
        let url = self.url(&format!(
            "/v1/documents/{document_id}/signatures/token/complete"
        ))?;
        self.send_json(self.http.post(url).json(&req)).await
    }

    pub async fn reject_token(
        &self,
        document_id: &str,
        req: TokenRejectRequest,
    ) -> Result<SignatureOutcomeResponse> {
        let url = self.url(&format!(
            "/v1/documents/{document_id}/signatures/token/reject"
        ))?;
        self.send_json(self.http.post(url).json(&req)).await
    }

    pub async fn create_token(&self, req: CreateTokenRequest) -> Result<CreateTokenResponse> {
        let url = self.url("/v1/admin/tokens")?;
        self.send_json(self.http.post(url).json(&req)).await
    }

    pub async fn list_tokens(&self) -> Result<Vec<TokenInfo>> {
        let url = self.url("/v1/admin/tokens")?;
        self.send_json(self.http.get(url)).await
    }

    pub async fn revoke_token(&self, id: &str) -> Result<()> {
        let url = self.url(&format!("/v1/admin/tokens/{id}"))?;
        self.send_empty(self.http.delete(url)).await
    }

    pub async fn whoami(&self) -> Result<WhoamiResponse> {
        let url = self.url("/v1/auth/whoami")?;
        self.send_json(self.http.get(url)).await
    }

    pub async fn capabilities(&self) -> Result<CapabilitiesResponse> {
        let url = self.url("/v1/capabilities")?;
        self.send_json(self.http.get(url)).await
    }

    /// Health is unauthenticated; no bearer header is sent.
    pub async fn health(&self) -> Result<HealthResponse> {
        let url = self.url("/v1/health")?;
        let response = self.http.get(url).send().await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!("API error ({}): {}", status, body);
        }
        Ok(serde_json::from_str(&body)?)
    }
}

// =============================================================================
// Request/response types (mirrored from server handlers)
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct DocumentResponse {
    pub id: String,
    pub case_id: Option<String>,
    pub title: Option<String>,
    pub content_hash: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub storage_ref: String,
    pub state: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
pub struct SignatureResponse {
    pub id: String,
    pub document_id: String,
    pub signer_id: String,
    pub modality: String,
    pub state: String,
    pub created_at: String,
    pub updated_at: String,
    pub signed_at: Option<String>,
    pub document_hash_at_request: String,
    pub certificate_serial: Option<String>,
    pub signature_blob: Option<String>,
    pub comment: Option<String>,
    pub external_reference: Option<String>,
    pub valid: bool,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct TokenPreparationResponse {
    pub solicitud_id: String,
    pub document_hash: String,
    pub nonce: String,
    pub algorithm: String,
}

#[derive(Debug, Deserialize)]
pub struct SignatureOutcomeResponse {
    pub signature: SignatureResponse,
    pub document_state: String,
    #[serde(default)]
    pub preparation: Option<TokenPreparationResponse>,
}

#[derive(Debug, Deserialize)]
pub struct VerificationResponse {
    pub document_id: String,
    pub integrity_ok: bool,
    pub recorded_hash: String,
    pub computed_hash: Option<String>,
    pub read_error: Option<String>,
    pub active_signatures: Vec<SignatureResponse>,
    pub drifted_signatures: Vec<String>,
    pub verified_at: String,
}

#[derive(Debug, Default, Serialize)]
pub struct DemoSignRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct HsmSignRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub resign: bool,
}

#[derive(Debug, Default, Serialize)]
pub struct TokenPrepareRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenCompleteRequest {
    pub solicitud_id: String,
    pub signature_blob: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_serial: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_reference: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenRejectRequest {
    pub solicitud_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
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

#[derive(Debug, Deserialize)]
pub struct WhoamiResponse {
    pub token_id: String,
    pub subject: String,
    pub scopes: Vec<String>,
    pub expires_at: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CapabilitiesResponse {
    pub modalities: Vec<String>,
    pub hash_algorithm: String,
    pub max_document_size: u64,
    pub completion_policy: serde_json::Value,
    pub hsm_authority: String,
    pub api_version: String,
}

#[derive(Debug, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}
