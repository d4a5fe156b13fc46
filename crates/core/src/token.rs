//! Token types and authorization.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

/// Unique identifier for a token.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenId(Uuid);

impl TokenId {
    /// Generate a new random token ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TokenId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenId({})", self.0)
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Token scopes for authorization.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenScope {
    /// Read documents, signatures and verification reports.
    #[serde(rename = "documents:read")]
    DocumentsRead,
    /// Sign documents as the token's subject.
    #[serde(rename = "documents:sign")]
    DocumentsSign,
    /// Register documents and manage tokens.
    #[serde(rename = "documents:admin")]
    DocumentsAdmin,
}

impl TokenScope {
    /// Parse from string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "documents:read" => Ok(Self::DocumentsRead),
            "documents:sign" => Ok(Self::DocumentsSign),
            "documents:admin" => Ok(Self::DocumentsAdmin),
            _ => Err(crate::Error::InvalidToken(format!("unknown scope: {s}"))),
        }
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DocumentsRead => "documents:read",
            Self::DocumentsSign => "documents:sign",
            Self::DocumentsAdmin => "documents:admin",
        }
    }

    /// Check if this scope implies another scope.
    pub fn implies(&self, other: &Self) -> bool {
        match self {
            Self::DocumentsAdmin => true,
            Self::DocumentsSign => matches!(other, Self::DocumentsSign | Self::DocumentsRead),
            Self::DocumentsRead => matches!(other, Self::DocumentsRead),
        }
    }
}

impl fmt::Display for TokenScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A validated token with its metadata.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Token {
    /// Token identifier.
    pub id: TokenId,
    /// Signer identity this token authenticates as.
    pub subject: String,
    /// Granted scopes.
    pub scopes: HashSet<TokenScope>,
    /// When the token expires.
    #[serde(with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
    /// When the token was revoked (if revoked).
    #[serde(with = "time::serde::rfc3339::option")]
    pub revoked_at: Option<OffsetDateTime>,
    /// When the token was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Description for the token.
    pub description: Option<String>,
}

impl Token {
    /// Check if the token is valid (not expired or revoked).
    pub fn is_valid(&self) -> bool {
        let now = OffsetDateTime::now_utc();

        if self.revoked_at.is_some() {
            return false;
        }

        if let Some(expires_at) = self.expires_at
            && now > expires_at
        {
            return false;
        }

        true
    }

    /// Check if the token has a specific scope.
    pub fn has_scope(&self, scope: TokenScope) -> bool {
        self.scopes.iter().any(|s| s.implies(&scope))
    }

    /// Check if the token can read documents.
    pub fn can_read(&self) -> bool {
        self.is_valid() && self.has_scope(TokenScope::DocumentsRead)
    }

    /// Check if the token can sign documents.
    pub fn can_sign(&self) -> bool {
        self.is_valid() && self.has_scope(TokenScope::DocumentsSign)
    }

    /// Check if the token has admin access.
    pub fn is_admin(&self) -> bool {
        self.is_valid() && self.has_scope(TokenScope::DocumentsAdmin)
    }
}

/// Request to create a token.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateTokenRequest {
    /// Signer identity for the new token.
    pub subject: String,
    /// Scopes to grant.
    pub scopes: Vec<String>,
    /// Expiration duration in seconds (optional).
    pub expires_in: Option<u64>,
    /// Description for the token.
    pub description: Option<String>,
}

/// Response from creating a token.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateTokenResponse {
    /// The token ID.
    pub token_id: String,
    /// The token secret (only returned once).
    pub token_secret: String,
    /// Subject the token authenticates as.
    pub subject: String,
    /// When the token expires.
    pub expires_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_with(scopes: &[TokenScope]) -> Token {
        Token {
            id: TokenId::new(),
            subject: "clerk-1".to_string(),
            scopes: scopes.iter().copied().collect(),
            expires_at: None,
            revoked_at: None,
            created_at: OffsetDateTime::now_utc(),
            description: None,
        }
    }

    #[test]
    fn test_scope_implies() {
        use TokenScope::*;
        assert!(DocumentsAdmin.implies(&DocumentsRead));
        assert!(DocumentsAdmin.implies(&DocumentsSign));
        assert!(DocumentsSign.implies(&DocumentsRead));
        assert!(!DocumentsSign.implies(&DocumentsAdmin));
        assert!(!DocumentsRead.implies(&DocumentsSign));
    }

    #[test]
    fn test_scope_parse() {
        assert_eq!(
            TokenScope::parse("documents:sign").unwrap(),
            TokenScope::DocumentsSign
        );
        assert!(TokenScope::parse("documents:write").is_err());
    }

    #[test]
    fn test_revoked_and_expired_tokens_are_invalid() {
        let mut token = token_with(&[TokenScope::DocumentsSign]);
        assert!(token.can_sign());
        assert!(token.can_read());
        assert!(!token.is_admin());

        token.expires_at = Some(OffsetDateTime::now_utc() - time::Duration::minutes(1));
        assert!(!token.can_sign());

        token.expires_at = None;
        token.revoked_at = Some(OffsetDateTime::now_utc());
        assert!(!token.is_valid());
    }
}
