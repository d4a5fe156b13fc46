//! Signature records and the per-record state machine.

use crate::document::DocumentId;
use crate::hash::ContentHash;
use crate::signature_meta::SignatureMetadata;
use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

/// Unique identifier for a signature record (the "solicitud" id).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignatureId(Uuid);

impl SignatureId {
    /// Generate a new random signature ID.
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
            .map_err(|e| crate::Error::InvalidId(format!("invalid signature ID: {e}")))
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SignatureId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SignatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SignatureId({})", self.0)
    }
}

impl fmt::Display for SignatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Signing mechanism used for a record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    /// Immediate, locally generated signature token.
    Demo,
    /// Two-phase flow with a client-side cryptographic step.
    Token,
    /// Single-phase simulated hardware signature.
    Hsm,
}

impl Modality {
    /// Parse from string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "demo" => Ok(Self::Demo),
            "token" => Ok(Self::Token),
            "hsm" => Ok(Self::Hsm),
            _ => Err(crate::Error::InvalidState(format!("unknown modality: {s}"))),
        }
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Demo => "demo",
            Self::Token => "token",
            Self::Hsm => "hsm",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a signature record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureState {
    /// Prepared, waiting for completion.
    Pending,
    /// Completed, carries a signature blob.
    Signed,
    /// Abandoned. Kept for history only.
    Rejected,
}

impl SignatureState {
    /// Parse from string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "signed" => Ok(Self::Signed),
            "rejected" => Ok(Self::Rejected),
            _ => Err(crate::Error::InvalidState(format!(
                "unknown signature state: {s}"
            ))),
        }
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Signed => "signed",
            Self::Rejected => "rejected",
        }
    }

    /// Counts toward the one-active-record-per-signer rule.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Signed)
    }
}

impl fmt::Display for SignatureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Random value binding a Token completion to its preparation.
///
/// 16 random bytes as 32 lowercase hex characters.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Nonce(String);

impl Nonce {
    /// Generate a fresh nonce.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        rand::rng().fill_bytes(&mut bytes);
        Self(bytes.iter().map(|b| format!("{b:02x}")).collect())
    }

    /// Parse and validate a nonce string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        if !is_lower_hex(s, 32) {
            return Err(crate::Error::InvalidNonce(format!(
                "expected 32 lowercase hex chars, got {s:?}"
            )));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Nonce {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::parse(&value)
    }
}

impl From<Nonce> for String {
    fn from(value: Nonce) -> Self {
        value.0
    }
}

impl fmt::Debug for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Nonce({})", self.0)
    }
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Correlation id linking a signature to an external system.
///
/// Accepted forms are a UUID or 32 hex characters. Generated references are
/// random UUID v4 strings.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ExternalReference(String);

impl ExternalReference {
    /// Generate a random UUID v4 reference.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Parse a reference in either accepted form. Stored lowercase.
    pub fn parse(s: &str) -> crate::Result<Self> {
        let s = s.trim().to_ascii_lowercase();
        if is_lower_hex(&s, 32) || Uuid::try_parse(&s).is_ok() {
            return Ok(Self(s));
        }
        Err(crate::Error::InvalidReference(format!(
            "expected a UUID or 32 hex chars, got {s:?}"
        )))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ExternalReference {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::parse(&value)
    }
}

impl From<ExternalReference> for String {
    fn from(value: ExternalReference) -> Self {
        value.0
    }
}

impl fmt::Debug for ExternalReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExternalReference({})", self.0)
    }
}

impl fmt::Display for ExternalReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque signature payload, standard base64.
///
/// Never cryptographically validated; only required to be non-empty base64.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SignatureBlob(String);

impl SignatureBlob {
    /// Validate a base64 blob supplied by a client.
    pub fn parse(s: &str) -> crate::Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(crate::Error::InvalidSignatureBlob(
                "signature blob is empty".to_string(),
            ));
        }
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(s)
            .map_err(|e| crate::Error::InvalidSignatureBlob(e.to_string()))?;
        if decoded.is_empty() {
            return Err(crate::Error::InvalidSignatureBlob(
                "signature blob decodes to zero bytes".to_string(),
            ));
        }
        Ok(Self(s.to_string()))
    }

    /// Encode raw bytes produced locally.
    pub fn encode(bytes: &[u8]) -> Self {
        Self(base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SignatureBlob {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::parse(&value)
    }
}

impl From<SignatureBlob> for String {
    fn from(value: SignatureBlob) -> Self {
        value.0
    }
}

impl fmt::Debug for SignatureBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let head: String = self.0.chars().take(12).collect();
        write!(f, "SignatureBlob({head}..)")
    }
}

/// Caller context captured into signature metadata.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

/// One signing attempt by one signer against one document.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignatureRecord {
    pub id: SignatureId,
    pub document_id: DocumentId,
    /// Identity of the signer, as reported by the identity provider.
    pub signer_id: String,
    pub modality: Modality,
    pub state: SignatureState,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub signed_at: Option<OffsetDateTime>,
    /// Document hash captured at creation. Never rewritten.
    pub document_hash_at_request: ContentHash,
    pub certificate_serial: Option<String>,
    /// Present exactly when `state` is `Signed`.
    pub signature_blob: Option<SignatureBlob>,
    pub comment: Option<String>,
    pub external_reference: Option<ExternalReference>,
    pub valid: bool,
    pub metadata: SignatureMetadata,
}

impl SignatureRecord {
    /// A new record waiting for completion.
    pub fn pending(
        document_id: DocumentId,
        signer_id: impl Into<String>,
        modality: Modality,
        document_hash: ContentHash,
        metadata: SignatureMetadata,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: SignatureId::new(),
            document_id,
            signer_id: signer_id.into(),
            modality,
            state: SignatureState::Pending,
            created_at: now,
            updated_at: now,
            signed_at: None,
            document_hash_at_request: document_hash,
            certificate_serial: None,
            signature_blob: None,
            comment: None,
            external_reference: None,
            valid: false,
            metadata,
        }
    }

    /// A new record created directly in `Signed`.
    pub fn signed(
        document_id: DocumentId,
        signer_id: impl Into<String>,
        modality: Modality,
        document_hash: ContentHash,
        blob: SignatureBlob,
        signed_at: OffsetDateTime,
        metadata: SignatureMetadata,
    ) -> Self {
        Self {
            id: SignatureId::new(),
            document_id,
            signer_id: signer_id.into(),
            modality,
            state: SignatureState::Signed,
            created_at: signed_at,
            updated_at: signed_at,
            signed_at: Some(signed_at),
            document_hash_at_request: document_hash,
            certificate_serial: None,
            signature_blob: Some(blob),
            comment: None,
            external_reference: None,
            valid: true,
            metadata,
        }
    }

    pub fn with_comment(mut self, comment: Option<String>) -> Self {
        self.comment = comment;
        self
    }

    pub fn with_certificate_serial(mut self, serial: Option<String>) -> Self {
        self.certificate_serial = serial;
        self
    }

    /// Counts toward the one-active-record-per-signer rule.
    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// A blob is present exactly when the record is signed.
    pub fn is_consistent(&self) -> bool {
        self.signature_blob.is_some() == (self.state == SignatureState::Signed)
    }

    /// True when the hash pinned at creation differs from `current`.
    pub fn has_drifted_from(&self, current: &ContentHash) -> bool {
        &self.document_hash_at_request != current
    }
}

fn is_lower_hex(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nonce_format() {
        let nonce = Nonce::generate();
        assert_eq!(nonce.as_str().len(), 32);
        assert!(Nonce::parse(nonce.as_str()).is_ok());
        assert!(Nonce::parse("ABCDEF0123456789ABCDEF0123456789").is_err());
        assert!(Nonce::parse("abc").is_err());
        assert_ne!(Nonce::generate(), Nonce::generate());
    }

    #[test]
    fn test_external_reference_forms() {
        let generated = ExternalReference::generate();
        assert!(Uuid::parse_str(generated.as_str()).is_ok());

        assert!(ExternalReference::parse("0123456789abcdef0123456789abcdef").is_ok());
        assert!(ExternalReference::parse("6F9619FF-8B86-D011-B42D-00CF4FC964FF").is_ok());
        assert!(ExternalReference::parse("case-42").is_err());
        assert!(ExternalReference::parse("").is_err());
    }

    #[test]
    fn test_signature_blob_validation() {
        assert!(SignatureBlob::parse("c2lnbmF0dXJl").is_ok());
        assert!(SignatureBlob::parse("").is_err());
        assert!(SignatureBlob::parse("   ").is_err());
        assert!(SignatureBlob::parse("not base64!").is_err());
    }

    #[test]
    fn test_state_flags() {
        assert!(SignatureState::Pending.is_active());
        assert!(SignatureState::Signed.is_active());
        assert!(!SignatureState::Rejected.is_active());
    }

    #[test]
    fn test_constructors_keep_blob_consistent() {
        let doc = DocumentId::new();
        let hash = ContentHash::compute(b"doc");

        let pending = SignatureRecord::pending(
            doc,
            "u1",
            Modality::Token,
            hash,
            SignatureMetadata::token_preparation(Nonce::generate()),
        );
        assert!(pending.is_consistent());
        assert!(!pending.valid);

        let signed = SignatureRecord::signed(
            doc,
            "u1",
            Modality::Demo,
            hash,
            SignatureBlob::encode(b"blob"),
            OffsetDateTime::now_utc(),
            SignatureMetadata::demo(&RequestContext::default()),
        );
        assert!(signed.is_consistent());
        assert!(signed.valid);
        assert!(!signed.has_drifted_from(&hash));
        assert!(signed.has_drifted_from(&ContentHash::compute(b"other")));
    }

    #[test]
    fn test_modality_parse() {
        for m in [Modality::Demo, Modality::Token, Modality::Hsm] {
            assert_eq!(Modality::parse(m.as_str()).unwrap(), m);
        }
        assert!(Modality::parse("fax").is_err());
    }
}
