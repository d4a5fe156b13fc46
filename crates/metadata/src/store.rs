//! Metadata store trait and the SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::repos::{BootstrapRepo, DocumentRepo, SignatureRepo, TokenRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore:
    DocumentRepo + SignatureRepo + TokenRepo + BootstrapRepo + Send + Sync
{
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
///
/// Runs on a single pooled connection, which serializes writers.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (or create) a database file.
    pub async fn new(path: impl AsRef<Path>) -> MetadataResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        Self::connect(opts).await
    }

    /// Open a private in-memory database.
    pub async fn in_memory() -> MetadataResult<Self> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        Self::connect(opts).await
    }

    async fn connect(opts: SqliteConnectOptions) -> MetadataResult<Self> {
        let pool = SqlitePoolOptions::new()
            // One connection: writers never contend for the database lock.
            .max_connections(1)
            // An in-memory database lives only as long as its connection.
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// Implement all the repository traits for SqliteStore
mod sqlite_impl {
    use super::*;
    use crate::error::classify;
    use crate::models::*;
    use rubrica_core::DocumentState;
    use sqlx::SqliteConnection;
    use time::OffsetDateTime;
    use uuid::Uuid;

    const SIGNATURE_COLUMNS: &str = "signature_id, document_id, signer_id, modality, state, \
        created_at, updated_at, signed_at, document_hash_at_request, certificate_serial, \
        signature_blob, comment, external_reference, valid, metadata, revision";

    async fn insert_signature_row(
        conn: &mut SqliteConnection,
        row: &SignatureRow,
    ) -> MetadataResult<()> {
        sqlx::query(&format!(
            "INSERT INTO signatures ({SIGNATURE_COLUMNS}) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(row.signature_id)
        .bind(row.document_id)
        .bind(&row.signer_id)
        .bind(&row.modality)
        .bind(&row.state)
        .bind(row.created_at)
        .bind(row.updated_at)
        .bind(row.signed_at)
        .bind(&row.document_hash_at_request)
        .bind(&row.certificate_serial)
        .bind(&row.signature_blob)
        .bind(&row.comment)
        .bind(&row.external_reference)
        .bind(row.valid)
        .bind(&row.metadata)
        .bind(row.revision)
        .execute(conn)
        .await
        .map_err(|e| {
            classify(e, || {
                format!(
                    "active signature for document {} and signer {}",
                    row.document_id, row.signer_id
                )
            })
        })?;
        Ok(())
    }

    #[async_trait]
    impl DocumentRepo for SqliteStore {
        async fn create_document(&self, document: &DocumentRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO documents (
                    document_id, case_id, title, content_hash, mime_type,
                    size_bytes, storage_ref, state, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(document.document_id)
            .bind(&document.case_id)
            .bind(&document.title)
            .bind(&document.content_hash)
            .bind(&document.mime_type)
            .bind(document.size_bytes)
            .bind(&document.storage_ref)
            .bind(&document.state)
            .bind(document.created_at)
            .bind(document.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| classify(e, || format!("document {}", document.document_id)))?;
            Ok(())
        }

        async fn get_document(&self, document_id: Uuid) -> MetadataResult<Option<DocumentRow>> {
            let row =
                sqlx::query_as::<_, DocumentRow>("SELECT * FROM documents WHERE document_id = ?")
                    .bind(document_id)
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(row)
        }

        async fn advance_document_state(
            &self,
            document_id: Uuid,
            target: DocumentState,
            updated_at: OffsetDateTime,
        ) -> MetadataResult<bool> {
            let result = sqlx::query(
                r#"
                UPDATE documents SET state = ?, updated_at = ?
                WHERE document_id = ?
                  AND (CASE state
                        WHEN 'pending_signature' THEN 0
                        WHEN 'in_signing' THEN 1
                        ELSE 2
                      END) < ?
                "#,
            )
            .bind(target.as_str())
            .bind(updated_at)
            .bind(document_id)
            .bind(i64::from(target.rank()))
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() > 0)
        }

        async fn list_documents_for_case(
            &self,
            case_id: &str,
        ) -> MetadataResult<Vec<DocumentRow>> {
            let rows = sqlx::query_as::<_, DocumentRow>(
                "SELECT * FROM documents WHERE case_id = ? ORDER BY created_at DESC",
            )
            .bind(case_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }
    }

    #[async_trait]
    impl SignatureRepo for SqliteStore {
        async fn insert_signature(&self, row: &SignatureRow) -> MetadataResult<()> {
            let mut conn = self.pool.acquire().await?;
            insert_signature_row(&mut conn, row).await
        }

        async fn insert_signature_discarding_pending(
            &self,
            row: &SignatureRow,
        ) -> MetadataResult<u64> {
            let mut tx = self.pool.begin().await?;

            let discarded = sqlx::query(
                "DELETE FROM signatures WHERE document_id = ? AND signer_id = ? AND state = 'pending'",
            )
            .bind(row.document_id)
            .bind(&row.signer_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            // Dropping the transaction on error rolls the delete back.
            insert_signature_row(&mut tx, row).await?;

            tx.commit().await?;
            Ok(discarded)
        }

        async fn get_signature(&self, signature_id: Uuid) -> MetadataResult<Option<SignatureRow>> {
            let row = sqlx::query_as::<_, SignatureRow>(
                "SELECT * FROM signatures WHERE signature_id = ?",
            )
            .bind(signature_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn get_active_signature(
            &self,
            document_id: Uuid,
            signer_id: &str,
        ) -> MetadataResult<Option<SignatureRow>> {
            let row = sqlx::query_as::<_, SignatureRow>(
                "SELECT * FROM signatures WHERE document_id = ? AND signer_id = ? AND state IN ('pending', 'signed')",
            )
            .bind(document_id)
            .bind(signer_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn list_signatures(&self, document_id: Uuid) -> MetadataResult<Vec<SignatureRow>> {
            let rows = sqlx::query_as::<_, SignatureRow>(
                "SELECT * FROM signatures WHERE document_id = ? ORDER BY created_at, signature_id",
            )
            .bind(document_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn list_signed_signatures(
            &self,
            document_id: Uuid,
        ) -> MetadataResult<Vec<SignatureRow>> {
            let rows = sqlx::query_as::<_, SignatureRow>(
                "SELECT * FROM signatures WHERE document_id = ? AND state = 'signed' ORDER BY signed_at, signature_id",
            )
            .bind(document_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn update_signature(
            &self,
            row: &SignatureRow,
            expected_state: &str,
        ) -> MetadataResult<bool> {
            // document_hash_at_request and the identity columns are never written here.
            let result = sqlx::query(
                r#"
                UPDATE signatures SET
                    state = ?, updated_at = ?, signed_at = ?, certificate_serial = ?,
                    signature_blob = ?, comment = ?, external_reference = ?, valid = ?,
                    metadata = ?, revision = revision + 1
                WHERE signature_id = ? AND state = ? AND revision = ?
                "#,
            )
            .bind(&row.state)
            .bind(row.updated_at)
            .bind(row.signed_at)
            .bind(&row.certificate_serial)
            .bind(&row.signature_blob)
            .bind(&row.comment)
            .bind(&row.external_reference)
            .bind(row.valid)
            .bind(&row.metadata)
            .bind(row.signature_id)
            .bind(expected_state)
            .bind(row.revision)
            .execute(&self.pool)
            .await
            .map_err(|e| classify(e, || format!("signature {}", row.signature_id)))?;
            Ok(result.rows_affected() > 0)
        }
    }

    #[async_trait]
    impl TokenRepo for SqliteStore {
        async fn create_token(&self, token: &TokenRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO tokens (
                    token_id, subject, token_hash, scopes, expires_at,
                    revoked_at, created_at, last_used_at, description
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(token.token_id)
            .bind(&token.subject)
            .bind(&token.token_hash)
            .bind(&token.scopes)
            .bind(token.expires_at)
            .bind(token.revoked_at)
            .bind(token.created_at)
            .bind(token.last_used_at)
            .bind(&token.description)
            .execute(&self.pool)
            .await
            .map_err(|e| classify(e, || format!("token {}", token.token_id)))?;
            Ok(())
        }

        async fn get_token_by_hash(&self, token_hash: &str) -> MetadataResult<Option<TokenRow>> {
            let row = sqlx::query_as::<_, TokenRow>("SELECT * FROM tokens WHERE token_hash = ?")
                .bind(token_hash)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn get_token(&self, token_id: Uuid) -> MetadataResult<Option<TokenRow>> {
            let row = sqlx::query_as::<_, TokenRow>("SELECT * FROM tokens WHERE token_id = ?")
                .bind(token_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn touch_token(&self, token_id: Uuid, used_at: OffsetDateTime) -> MetadataResult<()> {
            sqlx::query("UPDATE tokens SET last_used_at = ? WHERE token_id = ?")
                .bind(used_at)
                .bind(token_id)
                .execute(&self.pool)
                .await?;
            Ok(())
        }

        async fn revoke_token(
            &self,
            token_id: Uuid,
            revoked_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            let result = sqlx::query(
                "UPDATE tokens SET revoked_at = COALESCE(revoked_at, ?) WHERE token_id = ?",
            )
            .bind(revoked_at)
            .bind(token_id)
            .execute(&self.pool)
            .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!("token {token_id}")));
            }
            Ok(())
        }

        async fn list_tokens(&self, subject: Option<&str>) -> MetadataResult<Vec<TokenRow>> {
            let rows = match subject {
                Some(subject) => {
                    sqlx::query_as::<_, TokenRow>(
                        "SELECT * FROM tokens WHERE subject = ? ORDER BY created_at DESC",
                    )
                    .bind(subject)
                    .fetch_all(&self.pool)
                    .await?
                }
                None => {
                    sqlx::query_as::<_, TokenRow>("SELECT * FROM tokens ORDER BY created_at DESC")
                        .fetch_all(&self.pool)
                        .await?
                }
            };
            Ok(rows)
        }
    }

    #[async_trait]
    impl BootstrapRepo for SqliteStore {
        async fn get_bootstrap_token_id(&self) -> MetadataResult<Option<Uuid>> {
            let value: Option<Option<String>> =
                sqlx::query_scalar("SELECT bootstrap_token_id FROM bootstrap_state WHERE id = 1")
                    .fetch_optional(&self.pool)
                    .await?;
            value
                .flatten()
                .filter(|id| !id.is_empty())
                .map(|id| {
                    Uuid::parse_str(&id).map_err(|e| {
                        MetadataError::Corrupt(format!(
                            "invalid bootstrap_token_id uuid '{id}': {e}"
                        ))
                    })
                })
                .transpose()
        }

        async fn set_bootstrap_token_id(&self, token_id: Uuid) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO bootstrap_state (id, bootstrap_token_id)
                VALUES (1, ?)
                ON CONFLICT(id) DO UPDATE
                SET bootstrap_token_id = excluded.bootstrap_token_id
                "#,
            )
            .bind(token_id.to_string())
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn clear_bootstrap_token_id(&self) -> MetadataResult<()> {
            sqlx::query("UPDATE bootstrap_state SET bootstrap_token_id = NULL WHERE id = 1")
                .execute(&self.pool)
                .await?;
            Ok(())
        }
    }
}

/// SQL schema for SQLite.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    document_id BLOB PRIMARY KEY,
    case_id TEXT,
    title TEXT,
    content_hash TEXT NOT NULL CHECK (length(content_hash) = 64),
    mime_type TEXT NOT NULL,
    size_bytes INTEGER NOT NULL CHECK (size_bytes >= 0),
    storage_ref TEXT NOT NULL,
    state TEXT NOT NULL DEFAULT 'pending_signature'
        CHECK (state IN ('pending_signature', 'in_signing', 'signed')),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_documents_case ON documents(case_id);

CREATE TABLE IF NOT EXISTS signatures (
    signature_id BLOB PRIMARY KEY,
    document_id BLOB NOT NULL REFERENCES documents(document_id),
    signer_id TEXT NOT NULL,
    modality TEXT NOT NULL CHECK (modality IN ('demo', 'token', 'hsm')),
    state TEXT NOT NULL CHECK (state IN ('pending', 'signed', 'rejected')),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    signed_at TEXT,
    document_hash_at_request TEXT NOT NULL CHECK (length(document_hash_at_request) = 64),
    certificate_serial TEXT,
    signature_blob TEXT,
    comment TEXT,
    external_reference TEXT,
    valid INTEGER NOT NULL DEFAULT 0,
    metadata TEXT NOT NULL,
    revision INTEGER NOT NULL DEFAULT 0,
    CHECK ((signature_blob IS NOT NULL) = (state = 'signed'))
);
-- One pending or signed attempt per signer and document.
CREATE UNIQUE INDEX IF NOT EXISTS idx_signatures_active_signer
    ON signatures(document_id, signer_id) WHERE state IN ('pending', 'signed');
CREATE INDEX IF NOT EXISTS idx_signatures_document ON signatures(document_id, created_at);

CREATE TRIGGER IF NOT EXISTS trg_signatures_hash_immutable
BEFORE UPDATE OF document_hash_at_request ON signatures
WHEN NEW.document_hash_at_request IS NOT OLD.document_hash_at_request
BEGIN
    SELECT RAISE(ABORT, 'document_hash_at_request is immutable');
END;

CREATE TABLE IF NOT EXISTS tokens (
    token_id BLOB PRIMARY KEY,
    subject TEXT NOT NULL,
    token_hash TEXT NOT NULL UNIQUE,
    scopes TEXT NOT NULL,
    expires_at TEXT,
    revoked_at TEXT,
    created_at TEXT NOT NULL,
    last_used_at TEXT,
    description TEXT
);
CREATE INDEX IF NOT EXISTS idx_tokens_subject ON tokens(subject);

CREATE TABLE IF NOT EXISTS bootstrap_state (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    bootstrap_token_id TEXT
);
INSERT OR IGNORE INTO bootstrap_state (id, bootstrap_token_id) VALUES (1, NULL);
"#;
