#![allow(deprecated)] // cargo_bin is deprecated but still functional

use assert_cmd::Command;
use httpmock::Method::{GET, POST};
use httpmock::MockServer;
use predicates::str::contains;
use serde_json::json;
use std::net::TcpListener;
use tempfile::TempDir;

const DOCUMENT_ID: &str = "00000000-0000-0000-0000-0000000000d1";
// SHA-256 of "abc"
const ABC_HASH: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

fn rubricactl() -> Command {
    let mut cmd = Command::cargo_bin("rubricactl").unwrap();
    cmd.env_remove("RUBRICA_SERVER").env_remove("RUBRICA_TOKEN");
    cmd
}

fn document_json(content_hash: &str) -> serde_json::Value {
    json!({
        "id": DOCUMENT_ID,
        "case_id": "EXP-7",
        "title": null,
        "content_hash": content_hash,
        "mime_type": "application/pdf",
        "size_bytes": 3,
        "storage_ref": format!("documents/{DOCUMENT_ID}"),
        "state": "pending_signature",
        "created_at": "2024-01-01T00:00:00Z",
        "updated_at": "2024-01-01T00:00:00Z"
    })
}

#[test]
fn tokens_generate_prints_hash_for_server_config() {
    rubricactl()
        .args(["tokens", "generate", "--description", "bootstrap"])
        .assert()
        .success()
        .stdout(contains("token_hash = \"sha256:"))
        .stdout(contains("Description: bootstrap"));
}

#[test]
fn missing_server_is_reported() {
    rubricactl()
        .args(["whoami", "--token", "t"])
        .assert()
        .failure()
        .stderr(contains("missing server"));
}

#[test]
fn server_url_requires_scheme() {
    rubricactl()
        .args(["whoami", "--server", "rubrica.local", "--token", "t"])
        .assert()
        .failure()
        .stderr(contains("http:// or https://"));
}

#[test]
fn health_does_not_need_a_token() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/v1/health");
        then.status(200).json_body(json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION")
        }));
    });

    rubricactl()
        .args(["health", "--server", server.base_url().as_str()])
        .assert()
        .success()
        .stdout(contains("Status: ok"));
}

#[test]
fn register_uploads_file_and_checks_hash() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    let upload = server.mock(|when, then| {
        when.method(POST)
            .path("/v1/documents")
            .query_param("case_id", "EXP-7")
            .header("content-type", "application/pdf")
            .header("authorization", "Bearer clerk-token")
            .body("abc");
        then.status(201).json_body(document_json(ABC_HASH));
    });

    let temp = TempDir::new().unwrap();
    let file = temp.path().join("auto.pdf");
    std::fs::write(&file, b"abc").unwrap();

    rubricactl()
        .env("RUBRICA_SERVER", server.base_url())
        .env("RUBRICA_TOKEN", "clerk-token")
        .args(["documents", "register"])
        .arg(&file)
        .args(["--case", "EXP-7"])
        .assert()
        .success()
        .stdout(contains("Document registered successfully!"))
        .stdout(contains(DOCUMENT_ID));
    upload.assert();
}

#[test]
fn register_fails_when_server_hash_differs() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/v1/documents");
        then.status(201).json_body(document_json(&"0".repeat(64)));
    });

    let temp = TempDir::new().unwrap();
    let file = temp.path().join("auto.pdf");
    std::fs::write(&file, b"abc").unwrap();

    rubricactl()
        .args(["documents", "register", "--token", "t"])
        .arg("--server")
        .arg(server.base_url())
        .arg(&file)
        .assert()
        .failure()
        .stderr(contains("local file hashes to"));
}

#[test]
fn verify_exits_nonzero_on_integrity_failure() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET)
            .path(format!("/v1/documents/{DOCUMENT_ID}/verify"));
        then.status(200).json_body(json!({
            "document_id": DOCUMENT_ID,
            "integrity_ok": false,
            "recorded_hash": ABC_HASH,
            "computed_hash": "0".repeat(64),
            "read_error": null,
            "active_signatures": [],
            "drifted_signatures": [],
            "verified_at": "2024-01-02T00:00:00Z"
        }));
    });

    rubricactl()
        .args(["documents", "verify", DOCUMENT_ID, "--token", "t"])
        .arg("--server")
        .arg(server.base_url())
        .assert()
        .failure()
        .stdout(contains("Integrity: FAILED"))
        .stderr(contains("failed integrity verification"));
}

#[test]
fn token_complete_requires_a_blob() {
    rubricactl()
        .args([
            "token",
            "complete",
            DOCUMENT_ID,
            "--solicitud",
            DOCUMENT_ID,
            "--server",
            "http://127.0.0.1:9",
            "--token",
            "t",
        ])
        .assert()
        .failure()
        .stderr(contains("--blob"));
}
