//! Application state shared across handlers.

use crate::audit::{AuditEvent, AuditSink, TracingAuditSink};
use rubrica_core::config::AppConfig;
use rubrica_metadata::MetadataStore;
use rubrica_signer::SigningService;
use rubrica_storage::ObjectStore;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Object storage backend holding document bytes.
    pub storage: Arc<dyn ObjectStore>,
    /// Metadata store.
    pub metadata: Arc<dyn MetadataStore>,
    /// Signature workflow over the two stores above.
    pub signing: Arc<SigningService>,
    /// Audit hook, called after successful mutations.
    pub audit: Arc<dyn AuditSink>,
}

impl AppState {
    /// Create the application state with the tracing audit sink.
    pub fn new(
        config: AppConfig,
        storage: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
    ) -> Self {
        Self::with_audit(config, storage, metadata, Arc::new(TracingAuditSink))
    }

    pub fn with_audit(
        config: AppConfig,
        storage: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let signing = Arc::new(SigningService::new(
            Arc::clone(&metadata),
            Arc::clone(&storage),
            &config.workflow,
        ));
        Self {
            config: Arc::new(config),
            storage,
            metadata,
            signing,
            audit,
        }
    }

    pub fn audit(&self, event: AuditEvent) {
        self.audit.record(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rubrica_core::CompletionPolicy;
    use rubrica_metadata::SqliteStore;
    use rubrica_storage::FilesystemBackend;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_signing_service_uses_workflow_config() {
        let temp = tempdir().unwrap();
        let storage: Arc<dyn ObjectStore> =
            Arc::new(FilesystemBackend::new(temp.path()).await.unwrap());
        let metadata: Arc<dyn MetadataStore> =
            Arc::new(SqliteStore::new(temp.path().join("metadata.db")).await.unwrap());

        let mut config = AppConfig::for_testing();
        config.workflow.hsm_authority = "HSM-TEST-42".to_string();
        config.workflow.completion_policy = CompletionPolicy::AllOf {
            signers: ["judge".to_string()].into(),
        };

        let state = AppState::new(config, storage, metadata);
        assert_eq!(state.signing.hsm_authority(), "HSM-TEST-42");
        assert!(matches!(
            state.signing.completion_policy(),
            CompletionPolicy::AllOf { .. }
        ));
    }
}
