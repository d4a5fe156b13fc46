//! Tests for bootstrap token initialization behavior.

mod common;

use axum::http::StatusCode;
use common::TestServer;
use common::fixtures::{json_request, sha256_hash};
use rubrica_core::config::AdminConfig;
use rubrica_metadata::models::TokenRow;
use rubrica_server::bootstrap::ensure_admin_token;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

fn admin_config(raw_token: &str, description: Option<&str>) -> AdminConfig {
    AdminConfig {
        token_hash: format!("sha256:{}", sha256_hash(raw_token.as_bytes())),
        token_scopes: None,
        token_description: description.map(str::to_string),
        subject: "presidencia".to_string(),
    }
}

fn token_row(raw_token: &str) -> TokenRow {
    TokenRow {
        token_id: Uuid::new_v4(),
        subject: "presidencia".to_string(),
        token_hash: sha256_hash(raw_token.as_bytes()),
        scopes: r#"["documents:admin"]"#.to_string(),
        expires_at: None,
        revoked_at: None,
        created_at: OffsetDateTime::now_utc(),
        last_used_at: None,
        description: None,
    }
}

#[tokio::test]
async fn test_bootstrap_creates_token_when_none_exists() {
    let server = TestServer::new().await;
    let metadata = server.metadata();

    assert!(metadata.get_bootstrap_token_id().await.unwrap().is_none());

    let raw_token = "my-secret-bootstrap-token";
    let config = admin_config(raw_token, Some("Bootstrap test token"));
    ensure_admin_token(metadata.as_ref(), &config)
        .await
        .expect("Bootstrap should succeed");

    let bootstrap_id = metadata
        .get_bootstrap_token_id()
        .await
        .unwrap()
        .expect("Bootstrap token should exist");
    let token = metadata
        .get_token(bootstrap_id)
        .await
        .unwrap()
        .expect("Token should exist");

    assert_eq!(token.token_hash, sha256_hash(raw_token.as_bytes()));
    assert_eq!(token.subject, "presidencia");
    assert_eq!(token.description.as_deref(), Some("Bootstrap test token"));
    assert!(token.revoked_at.is_none());
    assert!(token.expires_at.is_none());

    let scopes: Vec<String> = serde_json::from_str(&token.scopes).unwrap();
    assert_eq!(scopes, vec!["documents:admin".to_string()]);
}

#[tokio::test]
async fn test_bootstrap_reuses_existing_valid_token() {
    let server = TestServer::new().await;
    let metadata = server.metadata();

    let raw_token = "existing-bootstrap-token";
    let existing = token_row(raw_token);
    metadata.create_token(&existing).await.unwrap();

    ensure_admin_token(metadata.as_ref(), &admin_config(raw_token, None))
        .await
        .expect("Bootstrap should succeed");

    let bootstrap_id = metadata.get_bootstrap_token_id().await.unwrap();
    assert_eq!(bootstrap_id, Some(existing.token_id));
    assert_eq!(metadata.list_tokens(None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_bootstrap_accepts_uppercase_hash() {
    let server = TestServer::new().await;
    let metadata = server.metadata();

    let raw_token = "uppercase-bootstrap-token";
    let config = AdminConfig {
        token_hash: sha256_hash(raw_token.as_bytes()).to_uppercase(),
        ..admin_config(raw_token, None)
    };
    ensure_admin_token(metadata.as_ref(), &config)
        .await
        .expect("Bootstrap should succeed");

    let token = metadata
        .get_token_by_hash(&sha256_hash(raw_token.as_bytes()))
        .await
        .unwrap();
    assert!(token.is_some(), "Hash should be stored lowercase");
}

#[tokio::test]
async fn test_bootstrap_rejects_revoked_token() {
    let server = TestServer::new().await;
    let metadata = server.metadata();

    let raw_token = "revoked-bootstrap-token";
    let revoked = TokenRow {
        revoked_at: Some(OffsetDateTime::now_utc()),
        ..token_row(raw_token)
    };
    metadata.create_token(&revoked).await.unwrap();

    let err = ensure_admin_token(metadata.as_ref(), &admin_config(raw_token, None))
        .await
        .expect_err("Bootstrap should fail for revoked token")
        .to_string();
    assert!(err.contains("revoked"), "Error should mention revoked: {err}");
}

#[tokio::test]
async fn test_bootstrap_rejects_expired_token() {
    let server = TestServer::new().await;
    let metadata = server.metadata();

    let raw_token = "expired-bootstrap-token";
    let expired = TokenRow {
        expires_at: Some(OffsetDateTime::now_utc() - Duration::hours(1)),
        created_at: OffsetDateTime::now_utc() - Duration::hours(2),
        ..token_row(raw_token)
    };
    metadata.create_token(&expired).await.unwrap();

    let err = ensure_admin_token(metadata.as_ref(), &admin_config(raw_token, None))
        .await
        .expect_err("Bootstrap should fail for expired token")
        .to_string();
    assert!(err.contains("expired"), "Error should mention expired: {err}");
}

#[tokio::test]
async fn test_bootstrap_revokes_old_token_when_hash_changes() {
    let server = TestServer::new().await;
    let metadata = server.metadata();

    ensure_admin_token(
        metadata.as_ref(),
        &admin_config("old-bootstrap-token", Some("Old token")),
    )
    .await
    .expect("First bootstrap should succeed");
    let old_token_id = metadata
        .get_bootstrap_token_id()
        .await
        .unwrap()
        .expect("Old token should exist");

    ensure_admin_token(
        metadata.as_ref(),
        &admin_config("new-bootstrap-token", Some("New token")),
    )
    .await
    .expect("Second bootstrap should succeed");

    let old_token = metadata.get_token(old_token_id).await.unwrap().unwrap();
    assert!(old_token.revoked_at.is_some(), "Old token should be revoked");

    let new_token_id = metadata
        .get_bootstrap_token_id()
        .await
        .unwrap()
        .expect("New token should exist");
    assert_ne!(new_token_id, old_token_id);
    let new_token = metadata.get_token(new_token_id).await.unwrap().unwrap();
    assert!(new_token.revoked_at.is_none());
}

#[tokio::test]
async fn test_bootstrap_with_custom_scopes() {
    let server = TestServer::new().await;
    let metadata = server.metadata();

    let config = AdminConfig {
        token_scopes: Some(vec![
            "documents:admin".to_string(),
            "documents:sign".to_string(),
        ]),
        ..admin_config("scoped-bootstrap-token", None)
    };
    ensure_admin_token(metadata.as_ref(), &config)
        .await
        .expect("Bootstrap should succeed");

    let token_id = metadata.get_bootstrap_token_id().await.unwrap().unwrap();
    let token = metadata.get_token(token_id).await.unwrap().unwrap();
    let scopes: Vec<String> = serde_json::from_str(&token.scopes).unwrap();
    assert_eq!(scopes, vec!["documents:admin", "documents:sign"]);
}

#[tokio::test]
async fn test_bootstrap_rejects_invalid_scope() {
    let server = TestServer::new().await;
    let metadata = server.metadata();

    let config = AdminConfig {
        token_scopes: Some(vec!["documents:root".to_string()]),
        ..admin_config("bad-scope-token", None)
    };
    let result = ensure_admin_token(metadata.as_ref(), &config).await;
    assert!(result.is_err());
    assert!(metadata.list_tokens(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_bootstrap_rejects_invalid_hash_format() {
    let server = TestServer::new().await;
    let metadata = server.metadata();

    let config = AdminConfig {
        token_hash: "sha256:abc123".to_string(),
        ..admin_config("unused", None)
    };
    assert!(
        ensure_admin_token(metadata.as_ref(), &config)
            .await
            .is_err(),
        "Should reject too-short hash"
    );

    let config = AdminConfig {
        token_hash: format!("sha256:{}", "g".repeat(64)),
        ..admin_config("unused", None)
    };
    assert!(
        ensure_admin_token(metadata.as_ref(), &config)
            .await
            .is_err(),
        "Should reject invalid hex chars"
    );
}

#[tokio::test]
async fn test_bootstrap_rejects_empty_subject() {
    let server = TestServer::new().await;
    let metadata = server.metadata();

    let config = AdminConfig {
        subject: "   ".to_string(),
        ..admin_config("no-subject-token", None)
    };
    let err = ensure_admin_token(metadata.as_ref(), &config)
        .await
        .expect_err("Empty subject must be rejected")
        .to_string();
    assert!(err.contains("subject"));
}

#[tokio::test]
async fn test_bootstrap_token_authenticates_as_configured_subject() {
    let server = TestServer::new().await;
    let metadata = server.metadata();

    let raw_token = "presidencia-admin-token";
    ensure_admin_token(metadata.as_ref(), &admin_config(raw_token, None))
        .await
        .unwrap();

    let (status, body) =
        json_request(&server.router, "GET", "/v1/auth/whoami", None, Some(raw_token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["subject"], "presidencia");
    assert_eq!(body["scopes"], serde_json::json!(["documents:admin"]));

    let (status, _) =
        json_request(&server.router, "GET", "/v1/admin/tokens", None, Some(raw_token)).await;
    assert_eq!(status, StatusCode::OK);
}
