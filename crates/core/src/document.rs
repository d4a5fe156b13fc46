//! Documents and their coarse signing state.

use crate::hash::ContentHash;
use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

/// Unique identifier for a document.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(Uuid);

impl DocumentId {
    /// Generate a new random document ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Parse from a string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| crate::Error::InvalidId(format!("invalid document ID: {e}")))
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Object store key holding the document bytes.
    pub fn storage_key(&self) -> String {
        format!("documents/{}", self.0)
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocumentId({})", self.0)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Coarse signing state of a document.
///
/// Only ever moves forward: `PendingSignature -> InSigning -> Signed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentState {
    /// No signing activity yet.
    PendingSignature,
    /// At least one signer started a flow, or the completion policy is not yet met.
    InSigning,
    /// The completion policy is satisfied.
    Signed,
}

impl DocumentState {
    /// Parse from the stored string form.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "pending_signature" => Ok(Self::PendingSignature),
            "in_signing" => Ok(Self::InSigning),
            "signed" => Ok(Self::Signed),
            _ => Err(crate::Error::InvalidState(format!(
                "unknown document state: {s}"
            ))),
        }
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingSignature => "pending_signature",
            Self::InSigning => "in_signing",
            Self::Signed => "signed",
        }
    }

    /// Position along the forward-only lifecycle.
    pub fn rank(&self) -> u8 {
        match self {
            Self::PendingSignature => 0,
            Self::InSigning => 1,
            Self::Signed => 2,
        }
    }

    /// Whether moving to `target` would be a forward step.
    pub fn can_advance_to(&self, target: Self) -> bool {
        target.rank() > self.rank()
    }
}

impl fmt::Display for DocumentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered document.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    /// Owning case file, opaque to this service.
    pub case_id: Option<String>,
    pub title: Option<String>,
    /// Hash of the bytes at registration time. Never changes.
    pub content_hash: ContentHash,
    pub mime_type: String,
    pub size_bytes: u64,
    /// Object store key of the document bytes.
    pub storage_ref: String,
    pub state: DocumentState,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Document {
    /// Create a freshly registered document in `PendingSignature`.
    pub fn new(
        id: DocumentId,
        content_hash: ContentHash,
        mime_type: impl Into<String>,
        size_bytes: u64,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id,
            case_id: None,
            title: None,
            content_hash,
            mime_type: mime_type.into(),
            size_bytes,
            storage_ref: id.storage_key(),
            state: DocumentState::PendingSignature,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_id_roundtrip() {
        let id = DocumentId::new();
        let parsed = DocumentId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
        assert!(DocumentId::parse("not-a-uuid").is_err());
    }

    #[test]
    fn test_state_only_advances() {
        use DocumentState::*;
        assert!(PendingSignature.can_advance_to(InSigning));
        assert!(PendingSignature.can_advance_to(Signed));
        assert!(InSigning.can_advance_to(Signed));
        assert!(!Signed.can_advance_to(InSigning));
        assert!(!InSigning.can_advance_to(InSigning));
        assert!(!Signed.can_advance_to(PendingSignature));
    }

    #[test]
    fn test_state_parse() {
        for state in [
            DocumentState::PendingSignature,
            DocumentState::InSigning,
            DocumentState::Signed,
        ] {
            assert_eq!(DocumentState::parse(state.as_str()).unwrap(), state);
        }
        assert!(DocumentState::parse("draft").is_err());
    }

    #[test]
    fn test_new_document_defaults() {
        let id = DocumentId::new();
        let doc = Document::new(id, ContentHash::compute(b"x"), "application/pdf", 1);
        assert_eq!(doc.state, DocumentState::PendingSignature);
        assert_eq!(doc.storage_ref, format!("documents/{id}"));
    }
}
