//! PostgreSQL-based metadata store implementation.

use crate::error::{MetadataError, MetadataResult, classify};
use crate::models::*;
use crate::repos::{BootstrapRepo, DocumentRepo, SignatureRepo, TokenRepo};
use crate::store::MetadataStore;
use async_trait::async_trait;
use rubrica_core::DocumentState;
use rubrica_core::config::PgSslMode;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode as SqlxPgSslMode};
use sqlx::{PgConnection, Pool, Postgres};
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

/// PostgreSQL schema (embedded).
const POSTGRES_SCHEMA: &str = include_str!("postgres_schema.sql");

/// Split the schema on `;`, keeping `$$`-quoted function bodies whole.
fn postgres_schema_statements(schema: &str) -> Vec<&str> {
    let bytes = schema.as_bytes();
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut in_dollar_quote = false;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' && bytes.get(i + 1) == Some(&b'$') {
            in_dollar_quote = !in_dollar_quote;
            i += 2;
            continue;
        }
        if bytes[i] == b';' && !in_dollar_quote {
            chunks.push(&schema[start..i]);
            start = i + 1;
        }
        i += 1;
    }
    chunks.push(&schema[start..]);

    chunks
        .into_iter()
        .filter_map(|statement| {
            let trimmed = statement.trim();
            if trimmed.is_empty() {
                return None;
            }
            let has_sql = trimmed.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            });
            has_sql.then_some(trimmed)
        })
        .collect()
}

/// PostgreSQL-based metadata store.
pub struct PostgresStore {
    pool: Pool<Postgres>,
}

impl PostgresStore {
    /// Create a new PostgreSQL store from a connection URL.
    pub async fn from_url(
        url: &str,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let opts = PgConnectOptions::from_str(url)?;
        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    /// Create a new PostgreSQL store from individual connection parameters.
    ///
    /// Lets the password arrive separately, e.g. through the environment.
    #[allow(clippy::too_many_arguments)]
    pub async fn from_params(
        host: &str,
        port: u16,
        username: Option<&str>,
        password: Option<&str>,
        database: &str,
        ssl_mode: Option<PgSslMode>,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let mut opts = PgConnectOptions::new()
            .host(host)
            .port(port)
            .database(database);

        if let Some(user) = username {
            opts = opts.username(user);
        }

        if let Some(pass) = password {
            opts = opts.password(pass);
        }

        if let Some(mode) = ssl_mode {
            let sqlx_mode = match mode {
                PgSslMode::Disable => SqlxPgSslMode::Disable,
                PgSslMode::Prefer => SqlxPgSslMode::Prefer,
                PgSslMode::Require => SqlxPgSslMode::Require,
            };
            opts = opts.ssl_mode(sqlx_mode);
        }

        tracing::info!(
            host = host,
            port = port,
            database = database,
            username = username.unwrap_or("<none>"),
            ssl_mode = ?ssl_mode,
            "Connecting to PostgreSQL with individual parameters"
        );

        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    async fn connect(
        mut opts: PgConnectOptions,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        if let Some(timeout_ms) = statement_timeout_ms {
            opts = opts.options([("statement_timeout", format!("{timeout_ms}ms"))]);
            tracing::info!("PostgreSQL statement_timeout set to {}ms", timeout_ms);
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for PostgresStore {
    async fn migrate(&self) -> MetadataResult<()> {
        // Prepared statements cannot carry more than one command.
        for statement in postgres_schema_statements(POSTGRES_SCHEMA) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

async fn insert_signature_row(conn: &mut PgConnection, row: &SignatureRow) -> MetadataResult<()> {
    sqlx::query(
        r#"
        INSERT INTO signatures (
            signature_id, document_id, signer_id, modality, state,
            created_at, updated_at, signed_at, document_hash_at_request, certificate_serial,
            signature_blob, comment, external_reference, valid, metadata, revision
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
        "#,
    )
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
impl DocumentRepo for PostgresStore {
    async fn create_document(&self, document: &DocumentRow) -> MetadataResult<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (
                document_id, case_id, title, content_hash, mime_type,
                size_bytes, storage_ref, state, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
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
        let row = sqlx::query_as::<_, DocumentRow>("SELECT * FROM documents WHERE document_id = $1")
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
            UPDATE documents SET state = $1, updated_at = $2
            WHERE document_id = $3
              AND (CASE state
                    WHEN 'pending_signature' THEN 0
                    WHEN 'in_signing' THEN 1
                    ELSE 2
                  END) < $4
            "#,
        )
        .bind(target.as_str())
        .bind(updated_at)
        .bind(document_id)
        .bind(i32::from(target.rank()))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_documents_for_case(&self, case_id: &str) -> MetadataResult<Vec<DocumentRow>> {
        let rows = sqlx::query_as::<_, DocumentRow>(
            "SELECT * FROM documents WHERE case_id = $1 ORDER BY created_at DESC",
        )
        .bind(case_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl SignatureRepo for PostgresStore {
    async fn insert_signature(&self, row: &SignatureRow) -> MetadataResult<()> {
        let mut conn = self.pool.acquire().await?;
        insert_signature_row(&mut conn, row).await
    }

    async fn insert_signature_discarding_pending(&self, row: &SignatureRow) -> MetadataResult<u64> {
        let mut tx = self.pool.begin().await?;

        let discarded = sqlx::query(
            "DELETE FROM signatures WHERE document_id = $1 AND signer_id = $2 AND state = 'pending'",
        )
        .bind(row.document_id)
        .bind(&row.signer_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        insert_signature_row(&mut tx, row).await?;

        tx.commit().await?;
        Ok(discarded)
    }

    async fn get_signature(&self, signature_id: Uuid) -> MetadataResult<Option<SignatureRow>> {
        let row =
            sqlx::query_as::<_, SignatureRow>("SELECT * FROM signatures WHERE signature_id = $1")
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
            "SELECT * FROM signatures WHERE document_id = $1 AND signer_id = $2 AND state IN ('pending', 'signed')",
        )
        .bind(document_id)
        .bind(signer_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_signatures(&self, document_id: Uuid) -> MetadataResult<Vec<SignatureRow>> {
        let rows = sqlx::query_as::<_, SignatureRow>(
            "SELECT * FROM signatures WHERE document_id = $1 ORDER BY created_at, signature_id",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_signed_signatures(&self, document_id: Uuid) -> MetadataResult<Vec<SignatureRow>> {
        let rows = sqlx::query_as::<_, SignatureRow>(
            "SELECT * FROM signatures WHERE document_id = $1 AND state = 'signed' ORDER BY signed_at, signature_id",
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
        let result = sqlx::query(
            r#"
            UPDATE signatures SET
                state = $1, updated_at = $2, signed_at = $3, certificate_serial = $4,
                signature_blob = $5, comment = $6, external_reference = $7, valid = $8,
                metadata = $9, revision = revision + 1
            WHERE signature_id = $10 AND state = $11 AND revision = $12
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
impl TokenRepo for PostgresStore {
    async fn create_token(&self, token: &TokenRow) -> MetadataResult<()> {
        sqlx::query(
            r#"
            INSERT INTO tokens (
                token_id, subject, token_hash, scopes, expires_at,
                revoked_at, created_at, last_used_at, description
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
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
        let row = sqlx::query_as::<_, TokenRow>("SELECT * FROM tokens WHERE token_hash = $1")
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn get_token(&self, token_id: Uuid) -> MetadataResult<Option<TokenRow>> {
        let row = sqlx::query_as::<_, TokenRow>("SELECT * FROM tokens WHERE token_id = $1")
            .bind(token_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn touch_token(&self, token_id: Uuid, used_at: OffsetDateTime) -> MetadataResult<()> {
        sqlx::query("UPDATE tokens SET last_used_at = $1 WHERE token_id = $2")
            .bind(used_at)
            .bind(token_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn revoke_token(&self, token_id: Uuid, revoked_at: OffsetDateTime) -> MetadataResult<()> {
        let result =
            sqlx::query("UPDATE tokens SET revoked_at = COALESCE(revoked_at, $1) WHERE token_id = $2")
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
                    "SELECT * FROM tokens WHERE subject = $1 ORDER BY created_at DESC",
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
impl BootstrapRepo for PostgresStore {
    async fn get_bootstrap_token_id(&self) -> MetadataResult<Option<Uuid>> {
        // None: no row. Some(None): row present, marker NULL.
        let value: Option<Option<Uuid>> =
            sqlx::query_scalar("SELECT bootstrap_token_id FROM bootstrap_state WHERE id = 1")
                .fetch_optional(&self.pool)
                .await?;
        Ok(value.flatten())
    }

    async fn set_bootstrap_token_id(&self, token_id: Uuid) -> MetadataResult<()> {
        sqlx::query(
            r#"
            INSERT INTO bootstrap_state (id, bootstrap_token_id)
            VALUES (1, $1)
            ON CONFLICT(id) DO UPDATE
            SET bootstrap_token_id = EXCLUDED.bootstrap_token_id
            "#,
        )
        .bind(token_id)
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
