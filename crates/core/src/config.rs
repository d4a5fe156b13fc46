//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum accepted document size in bytes.
    #[serde(default = "default_max_document_size")]
    pub max_document_size: u64,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    /// Restrict it at the network level to the scraper.
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_max_document_size() -> u64 {
    crate::DEFAULT_MAX_DOCUMENT_SIZE
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_document_size: default_max_document_size(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_document_size == 0 {
            return Err("server.max_document_size must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Admin token configuration.
///
/// The admin token is required for server operation. If the token hash
/// changes between restarts, the previous admin token is revoked and a new
/// one is created.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Pre-computed hash of the admin token (SHA256 hex, 64 characters).
    /// Generate with: `echo -n "your-secret-token" | sha256sum`
    pub token_hash: String,
    /// Scopes for the admin token (default: ["documents:admin"]).
    pub token_scopes: Option<Vec<String>>,
    /// Description for the admin token.
    pub token_description: Option<String>,
    /// Signer identity the admin token authenticates as.
    #[serde(default = "default_admin_subject")]
    pub subject: String,
}

fn default_admin_subject() -> String {
    "admin".to_string()
}

impl AdminConfig {
    /// Create a test configuration with a dummy token hash.
    ///
    /// **For testing only.** The hash is deterministic but not a real token.
    pub fn for_testing() -> Self {
        Self {
            // SHA256 of "test-admin-token"
            token_hash: "17d6bfe05d1b1fb7bc499f8e3f639c7b3eda4c40f321eef8887a0c04c89a99c5"
                .to_string(),
            token_scopes: None,
            token_description: Some("Test admin token".to_string()),
            subject: default_admin_subject(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        let trimmed = self.token_hash.trim();
        let hash = trimmed.strip_prefix("sha256:").unwrap_or(trimmed);
        if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err("admin.token_hash must be a 64-character SHA-256 hex digest".to_string());
        }
        if self.subject.trim().is_empty() {
            return Err("admin.subject cannot be empty".to_string());
        }
        if let Some(scopes) = &self.token_scopes {
            for scope in scopes {
                crate::TokenScope::parse(scope).map_err(|e| format!("admin.token_scopes: {e}"))?;
            }
        }
        Ok(())
    }
}

/// Storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage.
    Filesystem {
        /// Root directory for storage.
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/storage"),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StorageConfig::Filesystem { path } if path.as_os_str().is_empty() => {
                Err("storage.path cannot be empty".to_string())
            }
            StorageConfig::Filesystem { .. } => Ok(()),
        }
    }
}

/// PostgreSQL SSL mode configuration.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PgSslMode {
    /// Disable SSL/TLS entirely.
    Disable,
    /// Prefer SSL/TLS but allow unencrypted connections (default).
    #[default]
    Prefer,
    /// Require SSL/TLS for all connections.
    Require,
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database (testing and small deployments).
    Sqlite {
        /// Database file path.
        path: PathBuf,
    },
    /// PostgreSQL database.
    Postgres {
        /// Connection URL. Takes precedence over individual fields.
        url: Option<String>,
        host: Option<String>,
        #[serde(default = "default_pg_port")]
        port: Option<u16>,
        username: Option<String>,
        /// Prefer RUBRICA_METADATA__PASSWORD over storing it in the file.
        password: Option<String>,
        database: Option<String>,
        ssl_mode: Option<PgSslMode>,
        /// Maximum connections in the pool.
        #[serde(default = "default_max_connections")]
        max_connections: u32,
        /// Statement timeout in milliseconds.
        #[serde(default = "default_statement_timeout_ms")]
        statement_timeout_ms: Option<u64>,
    },
}

fn default_max_connections() -> u32 {
    10
}

fn default_pg_port() -> Option<u16> {
    Some(5432)
}

fn default_statement_timeout_ms() -> Option<u64> {
    Some(30_000)
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/metadata.db"),
        }
    }
}

impl MetadataConfig {
    /// Validate metadata configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            MetadataConfig::Sqlite { .. } => Ok(()),
            MetadataConfig::Postgres {
                url,
                host,
                database,
                max_connections,
                ..
            } => {
                if *max_connections == 0 {
                    return Err("metadata.max_connections must be greater than 0".to_string());
                }
                match (url.as_ref(), host.as_ref(), database.as_ref()) {
                    (Some(_), _, _) => Ok(()),
                    (None, Some(_), Some(_)) => Ok(()),
                    (None, None, _) => Err(
                        "postgres config requires either 'url' or 'host' + 'database'".to_string(),
                    ),
                    (None, Some(_), None) => Err(
                        "postgres config requires 'database' when using individual fields"
                            .to_string(),
                    ),
                }
            }
        }
    }
}

/// When a document counts as fully signed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CompletionPolicy {
    /// The first signer to reach `Signed` completes the document.
    #[default]
    AnySigner,
    /// Every listed signer must hold a signed record.
    AllOf { signers: BTreeSet<String> },
}

impl CompletionPolicy {
    /// Whether the set of signers holding signed records satisfies the policy.
    pub fn is_satisfied<'a>(&self, signed_by: impl IntoIterator<Item = &'a str>) -> bool {
        match self {
            Self::AnySigner => signed_by.into_iter().next().is_some(),
            Self::AllOf { signers } => {
                let have: BTreeSet<&str> = signed_by.into_iter().collect();
                signers.iter().all(|s| have.contains(s.as_str()))
            }
        }
    }
}

/// Signing workflow configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default)]
    pub completion_policy: CompletionPolicy,
    /// Certificate serial stamped on simulated HSM signatures.
    #[serde(default = "default_hsm_authority")]
    pub hsm_authority: String,
}

fn default_hsm_authority() -> String {
    "RUBRICA-HSM-SIM-0001".to_string()
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            completion_policy: CompletionPolicy::default(),
            hsm_authority: default_hsm_authority(),
        }
    }
}

impl WorkflowConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.hsm_authority.trim().is_empty() {
            return Err("workflow.hsm_authority cannot be empty".to_string());
        }
        if let CompletionPolicy::AllOf { signers } = &self.completion_policy {
            if signers.is_empty() || signers.iter().any(|s| s.trim().is_empty()) {
                return Err(
                    "workflow.completion_policy all_of requires a non-empty list of signers"
                        .to_string(),
                );
            }
            // Signer ids are trimmed before they are recorded.
            if let Some(padded) = signers.iter().find(|s| s.trim() != s.as_str()) {
                return Err(format!(
                    "workflow.completion_policy signer {padded:?} has surrounding whitespace"
                ));
            }
        }
        Ok(())
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    /// Admin token configuration (required).
    pub admin: AdminConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
}

impl AppConfig {
    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** Uses filesystem storage, SQLite metadata,
    /// and a dummy admin token.
    pub fn for_testing() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            metadata: MetadataConfig::default(),
            admin: AdminConfig::for_testing(),
            workflow: WorkflowConfig::default(),
        }
    }

    /// Validate every section, stopping at the first error.
    pub fn validate(&self) -> Result<(), String> {
        self.server.validate()?;
        self.storage.validate()?;
        self.metadata.validate()?;
        self.admin.validate()?;
        self.workflow.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_testing_config_is_valid() {
        AppConfig::for_testing().validate().unwrap();
    }

    #[test]
    fn test_server_config_defaults() {
        let config = ServerConfig::default();
        assert!(config.metrics_enabled);
        assert_eq!(config.max_document_size, crate::DEFAULT_MAX_DOCUMENT_SIZE);
    }

    #[test]
    fn test_completion_policy_defaults_to_any_signer() {
        let json = r#"{"hsm_authority": "X"}"#;
        let config: WorkflowConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.completion_policy, CompletionPolicy::AnySigner);
    }

    #[test]
    fn test_completion_policy_all_of_deserialize() {
        let json = r#"{"completion_policy": {"mode": "all_of", "signers": ["judge", "clerk"]}}"#;
        let config: WorkflowConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.hsm_authority, "RUBRICA-HSM-SIM-0001");
        match &config.completion_policy {
            CompletionPolicy::AllOf { signers } => assert_eq!(signers.len(), 2),
            other => panic!("unexpected policy: {other:?}"),
        }
        config.validate().unwrap();
    }

    #[test]
    fn test_completion_policy_satisfaction() {
        assert!(!CompletionPolicy::AnySigner.is_satisfied([]));
        assert!(CompletionPolicy::AnySigner.is_satisfied(["u1"]));

        let all_of = CompletionPolicy::AllOf {
            signers: ["judge".to_string(), "clerk".to_string()].into(),
        };
        assert!(!all_of.is_satisfied(["judge"]));
        assert!(all_of.is_satisfied(["clerk", "judge", "extra"]));
    }

    #[test]
    fn test_empty_all_of_rejected() {
        let config = WorkflowConfig {
            completion_policy: CompletionPolicy::AllOf {
                signers: BTreeSet::new(),
            },
            hsm_authority: default_hsm_authority(),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_all_of_signer_with_whitespace_rejected() {
        let policy = |names: &[&str]| WorkflowConfig {
            completion_policy: CompletionPolicy::AllOf {
                signers: names.iter().map(|s| s.to_string()).collect(),
            },
            hsm_authority: default_hsm_authority(),
        };

        let err = policy(&["judge ", "clerk"]).validate().unwrap_err();
        assert!(err.contains("\"judge \""), "{err}");
        assert!(policy(&["\tclerk"]).validate().is_err());
        assert!(policy(&["judge", "clerk"]).validate().is_ok());
    }

    #[test]
    fn test_admin_token_hash_validated() {
        let mut admin = AdminConfig::for_testing();
        admin.token_hash = "short".to_string();
        assert!(admin.validate().is_err());

        let mut admin = AdminConfig::for_testing();
        admin.token_scopes = Some(vec!["documents:root".to_string()]);
        assert!(admin.validate().is_err());

        let mut admin = AdminConfig::for_testing();
        admin.token_hash = format!("sha256:{}", admin.token_hash);
        assert!(admin.validate().is_ok());
    }

    #[test]
    fn test_postgres_requires_url_or_host() {
        let config = MetadataConfig::Postgres {
            url: None,
            host: None,
            port: default_pg_port(),
            username: None,
            password: None,
            database: Some("rubrica".to_string()),
            ssl_mode: None,
            max_connections: default_max_connections(),
            statement_timeout_ms: default_statement_timeout_ms(),
        };
        assert!(config.validate().is_err());
    }
}
