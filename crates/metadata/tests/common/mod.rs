//! Metadata store test utilities.

use rubrica_core::{
    ContentHash, Document, DocumentId, Modality, Nonce, RequestContext, SignatureBlob,
    SignatureMetadata, SignatureRecord,
};
use rubrica_metadata::models::{DocumentRow, SignatureRow};
use rubrica_metadata::{MetadataResult, MetadataStore, PostgresStore, SqliteStore};
use std::sync::Arc;
use tempfile::TempDir;
use testcontainers::{ContainerAsync, ImageExt, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use time::OffsetDateTime;

/// Marks Docker/container startup failures so tests can skip on them.
pub const POSTGRES_CONTAINER_START_ERR_PREFIX: &str = "postgres-container-start:";

/// SQLite store on a temporary file.
#[allow(dead_code)]
pub struct TestMetadata {
    pub store: Arc<dyn MetadataStore>,
    _temp_dir: TempDir,
}

impl TestMetadata {
    pub async fn new() -> MetadataResult<Self> {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let store = SqliteStore::new(temp_dir.path().join("test.db")).await?;
        Ok(Self {
            store: Arc::new(store),
            _temp_dir: temp_dir,
        })
    }

    pub fn store(&self) -> Arc<dyn MetadataStore> {
        self.store.clone()
    }
}

/// PostgreSQL store backed by a throwaway container.
#[allow(dead_code)]
pub struct PostgresTestMetadata {
    pub store: Arc<dyn MetadataStore>,
    pub postgres: Arc<PostgresStore>,
    _container: ContainerAsync<Postgres>,
}

impl PostgresTestMetadata {
    pub async fn new() -> MetadataResult<Self> {
        let container = Postgres::default()
            .with_tag("16-alpine")
            .start()
            .await
            .map_err(|e| {
                rubrica_metadata::MetadataError::Internal(format!(
                    "{POSTGRES_CONTAINER_START_ERR_PREFIX} Failed to start PostgreSQL container: {e}"
                ))
            })?;

        let host = container.get_host().await.expect("Failed to get host");
        let port = container
            .get_host_port_ipv4(5432)
            .await
            .expect("Failed to get port");

        let url = format!("postgres://postgres:postgres@{host}:{port}/postgres");
        let postgres = Arc::new(PostgresStore::from_url(&url, 5, None).await?);

        Ok(Self {
            store: postgres.clone(),
            postgres,
            _container: container,
        })
    }

    pub fn store(&self) -> Arc<dyn MetadataStore> {
        self.store.clone()
    }
}

/// Run a test against SQLite and, when Docker is available, PostgreSQL.
pub async fn run_metadata_test_both<F, Fut>(test_fn: F)
where
    F: Fn(Arc<dyn MetadataStore>) -> Fut + Clone,
    Fut: std::future::Future<Output = ()>,
{
    let sqlite = TestMetadata::new()
        .await
        .expect("Failed to create SQLite test metadata");
    test_fn.clone()(sqlite.store()).await;

    if std::env::var("SKIP_POSTGRES_TESTS").is_ok() {
        return;
    }
    match PostgresTestMetadata::new().await {
        Ok(postgres) => test_fn(postgres.store()).await,
        Err(err) => {
            let msg = err.to_string();
            if msg.contains(POSTGRES_CONTAINER_START_ERR_PREFIX) {
                eprintln!("Skipping PostgreSQL metadata tests (Docker unavailable): {msg}");
            } else {
                panic!("PostgreSQL test setup failed: {msg}");
            }
        }
    }
}

/// Register a document row and return its id and hash.
#[allow(dead_code)]
pub async fn seed_document(store: &Arc<dyn MetadataStore>) -> (DocumentId, ContentHash) {
    let hash = ContentHash::compute(DocumentId::new().to_string().as_bytes());
    let doc = Document::new(DocumentId::new(), hash, "application/pdf", 1024);
    store
        .create_document(&DocumentRow::from_document(&doc))
        .await
        .expect("Failed to create document");
    (doc.id, hash)
}

#[allow(dead_code)]
pub fn pending_token_row(doc: DocumentId, signer: &str, hash: ContentHash) -> SignatureRow {
    let record = SignatureRecord::pending(
        doc,
        signer,
        Modality::Token,
        hash,
        SignatureMetadata::token_preparation(Nonce::generate()),
    );
    SignatureRow::from_record(&record, 0).expect("row conversion")
}

#[allow(dead_code)]
pub fn signed_demo_row(doc: DocumentId, signer: &str, hash: ContentHash) -> SignatureRow {
    let record = SignatureRecord::signed(
        doc,
        signer,
        Modality::Demo,
        hash,
        SignatureBlob::encode(signer.as_bytes()),
        OffsetDateTime::now_utc(),
        SignatureMetadata::demo(&RequestContext::default()),
    );
    SignatureRow::from_record(&record, 0).expect("row conversion")
}
