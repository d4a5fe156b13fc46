//! Server test utilities.

use super::fixtures::{bytes_request, sha256_hash};
use axum::http::StatusCode;
use bytes::Bytes;
use rubrica_core::config::{AdminConfig, AppConfig, MetadataConfig, StorageConfig};
use rubrica_metadata::models::TokenRow;
use rubrica_metadata::{MetadataStore, SqliteStore};
use rubrica_server::audit::{AuditEvent, AuditSink};
use rubrica_server::{AppState, create_router};
use rubrica_storage::{FilesystemBackend, ObjectStore};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use time::OffsetDateTime;
use uuid::Uuid;

/// Audit sink that keeps events in memory.
#[derive(Default)]
pub struct RecordingAudit {
    events: Mutex<Vec<AuditEvent>>,
}

#[allow(dead_code)]
impl RecordingAudit {
    pub fn actions(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.action.as_str())
            .collect()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl AuditSink for RecordingAudit {
    fn record(&self, event: AuditEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    pub audit: Arc<RecordingAudit>,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a new test server with temporary storage.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");

        let storage_path = temp_dir.path().join("storage");
        let storage: Arc<dyn ObjectStore> = Arc::new(
            FilesystemBackend::new(&storage_path)
                .await
                .expect("Failed to create storage backend"),
        );

        let db_path = temp_dir.path().join("metadata.db");
        let metadata: Arc<dyn MetadataStore> = Arc::new(
            SqliteStore::new(&db_path)
                .await
                .expect("Failed to create metadata store"),
        );

        let mut config = AppConfig {
            server: Default::default(),
            storage: StorageConfig::Filesystem {
                path: storage_path.clone(),
            },
            metadata: MetadataConfig::Sqlite { path: db_path },
            admin: AdminConfig::for_testing(),
            workflow: Default::default(),
        };
        modifier(&mut config);

        let audit = Arc::new(RecordingAudit::default());
        let state = AppState::with_audit(config, storage, metadata, audit.clone());
        let router = create_router(state.clone());

        Self {
            router,
            state,
            audit,
            _temp_dir: temp_dir,
        }
    }

    /// Get access to the underlying metadata.
    pub fn metadata(&self) -> Arc<dyn MetadataStore> {
        self.state.metadata.clone()
    }

    /// Get access to the underlying object store.
    pub fn storage(&self) -> Arc<dyn ObjectStore> {
        self.state.storage.clone()
    }

    /// Insert a token for `subject` and return the raw secret.
    pub async fn create_token(&self, subject: &str, scopes: &[&str]) -> String {
        let raw_token = format!("test-token-{}", Uuid::new_v4());
        let token = TokenRow {
            token_id: Uuid::new_v4(),
            subject: subject.to_string(),
            token_hash: sha256_hash(raw_token.as_bytes()),
            scopes: serde_json::to_string(scopes).unwrap(),
            expires_at: None,
            revoked_at: None,
            created_at: OffsetDateTime::now_utc(),
            last_used_at: None,
            description: Some("Test Token".to_string()),
        };
        self.metadata()
            .create_token(&token)
            .await
            .expect("Failed to create token");
        raw_token
    }

    /// Token with `documents:admin`.
    pub async fn admin_token(&self) -> String {
        self.create_token("registry", &["documents:admin"]).await
    }

    /// Register a PDF through the API and return its id.
    pub async fn register_document(&self, bytes: Bytes) -> String {
        let admin = self.admin_token().await;
        let (status, body) = bytes_request(
            &self.router,
            "/v1/documents?case_id=EXP-2024-0042&title=Auto%20de%20admisi%C3%B3n",
            Some("application/pdf"),
            bytes,
            Some(&admin),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
        body["id"].as_str().expect("document id").to_string()
    }
}
