//! Shared fixtures for signing workflow tests.

use async_trait::async_trait;
use bytes::Bytes;
use rubrica_core::config::WorkflowConfig;
use rubrica_core::{CompletionPolicy, Document, RequestContext};
use rubrica_metadata::{MetadataStore, SqliteStore};
use rubrica_signer::{NewDocument, SigningService};
use rubrica_storage::{
    ByteStream, FilesystemBackend, ObjectMeta, ObjectStore, StorageError, StorageResult,
};
use std::sync::Arc;
use tempfile::TempDir;

/// A signing service over a temporary SQLite file and storage directory.
#[allow(dead_code)]
pub struct TestWorkflow {
    pub service: Arc<SigningService>,
    pub metadata: Arc<dyn MetadataStore>,
    pub storage: Arc<dyn ObjectStore>,
    /// The concrete store behind `metadata`, when it is SQLite.
    pub sqlite: Option<Arc<SqliteStore>>,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestWorkflow {
    pub async fn new() -> Self {
        Self::with_policy(CompletionPolicy::AnySigner).await
    }

    pub async fn with_policy(policy: CompletionPolicy) -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let sqlite = Arc::new(
            SqliteStore::new(temp_dir.path().join("metadata.db"))
                .await
                .expect("Failed to open SQLite store"),
        );
        let metadata: Arc<dyn MetadataStore> = sqlite.clone();
        let storage: Arc<dyn ObjectStore> = Arc::new(
            FilesystemBackend::new(temp_dir.path().join("storage"))
                .await
                .expect("Failed to open storage"),
        );
        let mut workflow = Self::assemble(metadata, storage, policy, temp_dir);
        workflow.sqlite = Some(sqlite);
        workflow
    }

    /// Same metadata, but reads go through `storage` instead.
    pub fn with_storage(metadata: Arc<dyn MetadataStore>, storage: Arc<dyn ObjectStore>) -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        Self::assemble(metadata, storage, CompletionPolicy::AnySigner, temp_dir)
    }

    fn assemble(
        metadata: Arc<dyn MetadataStore>,
        storage: Arc<dyn ObjectStore>,
        policy: CompletionPolicy,
        temp_dir: TempDir,
    ) -> Self {
        let workflow = WorkflowConfig {
            completion_policy: policy,
            ..WorkflowConfig::default()
        };
        let service = Arc::new(SigningService::new(
            Arc::clone(&metadata),
            Arc::clone(&storage),
            &workflow,
        ));
        Self {
            service,
            metadata,
            storage,
            sqlite: None,
            _temp_dir: temp_dir,
        }
    }

    /// Register a small PDF-like document.
    pub async fn document(&self) -> Document {
        self.document_with(b"%PDF-1.7 auto de admision").await
    }

    pub async fn document_with(&self, bytes: &'static [u8]) -> Document {
        self.service
            .register_document(NewDocument {
                bytes: Bytes::from_static(bytes),
                mime_type: "application/pdf".to_string(),
                case_id: Some("EXP-2024-0001".to_string()),
                title: None,
            })
            .await
            .expect("Failed to register document")
    }
}

#[allow(dead_code)]
pub fn ctx() -> RequestContext {
    RequestContext {
        ip: Some("10.1.2.3".to_string()),
        user_agent: Some("rubrica-tests".to_string()),
    }
}

/// Storage whose reads fail part-way through the stream.
#[allow(dead_code)]
pub struct FailingReads {
    pub inner: Arc<dyn ObjectStore>,
}

#[async_trait]
impl ObjectStore for FailingReads {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.inner.exists(key).await
    }

    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        self.inner.head(key).await
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        self.inner.get(key).await
    }

    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream> {
        let first = self.inner.get(key).await?;
        let chunks: Vec<StorageResult<Bytes>> = vec![
            Ok(first),
            Err(StorageError::Io(std::io::Error::other("disk went away"))),
        ];
        Ok(Box::pin(futures::stream::iter(chunks)))
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        self.inner.put(key, data).await
    }

    async fn put_if_not_exists(&self, key: &str, data: Bytes) -> StorageResult<bool> {
        self.inner.put_if_not_exists(key, data).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.inner.delete(key).await
    }

    fn backend_name(&self) -> &'static str {
        "failing"
    }
}
