//! Admin token initialization.

use anyhow::{Result, bail};
use rubrica_core::config::AdminConfig;
use rubrica_core::token::TokenScope;
use rubrica_metadata::MetadataStore;
use rubrica_metadata::models::TokenRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Ensure the configured admin token exists, rotating the previous one if needed.
///
/// If the token hash changes between restarts, the previous admin token is
/// revoked and a new one is created with the new hash.
pub async fn ensure_admin_token(metadata: &dyn MetadataStore, config: &AdminConfig) -> Result<()> {
    // Stored hashes are lowercase hex, as produced by auth::hash_token.
    let trimmed = config.token_hash.trim();
    let hash = trimmed
        .strip_prefix("sha256:")
        .unwrap_or(trimmed)
        .to_lowercase();
    if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
        bail!("invalid admin token_hash: expected 64 hex chars");
    }
    let subject = config.subject.trim();
    if subject.is_empty() {
        bail!("admin subject cannot be empty");
    }

    if let Some(existing) = metadata.get_token_by_hash(&hash).await? {
        if existing.revoked_at.is_some() {
            bail!(
                "admin token hash matches a revoked token (id={}); \
                 use a new token hash",
                existing.token_id
            );
        }
        let now = OffsetDateTime::now_utc();
        if let Some(expires_at) = existing.expires_at
            && expires_at <= now
        {
            bail!(
                "admin token hash matches an expired token (id={}, expired={}); \
                 use a new token hash",
                existing.token_id,
                expires_at
            );
        }
        metadata.set_bootstrap_token_id(existing.token_id).await?;
        tracing::debug!(token_id = %existing.token_id, "Admin token already exists");
        return Ok(());
    }

    let now = OffsetDateTime::now_utc();
    if let Some(prev_id) = metadata.get_bootstrap_token_id().await? {
        match metadata.revoke_token(prev_id, now).await {
            Ok(()) => tracing::info!(token_id = %prev_id, "Previous admin token revoked"),
            Err(rubrica_metadata::MetadataError::NotFound(_)) => {
                tracing::warn!(token_id = %prev_id, "Previous admin token no longer exists");
            }
            Err(e) => return Err(e.into()),
        }
    }

    let scopes = config
        .token_scopes
        .clone()
        .unwrap_or_else(|| vec![TokenScope::DocumentsAdmin.as_str().to_string()]);
    for scope in &scopes {
        TokenScope::parse(scope).map_err(|_| anyhow::anyhow!("invalid admin scope: {scope}"))?;
    }

    let token = TokenRow {
        token_id: Uuid::new_v4(),
        subject: subject.to_string(),
        token_hash: hash,
        scopes: serde_json::to_string(&scopes)?,
        expires_at: None,
        revoked_at: None,
        created_at: now,
        last_used_at: None,
        description: config.token_description.clone(),
    };

    metadata.create_token(&token).await?;
    metadata.set_bootstrap_token_id(token.token_id).await?;
    tracing::info!(token_id = %token.token_id, subject = %token.subject, "Admin token created");

    Ok(())
}
