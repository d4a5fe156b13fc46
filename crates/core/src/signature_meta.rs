//! Typed per-modality signature metadata.
//!
//! Each modality and phase carries its own variant. The `extra` maps stay
//! open so clients can attach additional keys without a schema change.

use crate::signature::{Nonce, RequestContext};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::OffsetDateTime;

/// Open key/value map carried alongside the typed fields.
pub type Extra = BTreeMap<String, serde_json::Value>;

/// Origin label stamped on Demo signatures.
pub const DEMO_ORIGIN: &str = "demo";

/// Summary of an HSM signature that was superseded by a re-sign.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HsmHistoryEntry {
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub signed_at: Option<OffsetDateTime>,
    pub signature_blob: Option<String>,
    pub certificate_serial: Option<String>,
}

/// Metadata attached to a signature record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignatureMetadata {
    /// Token flow prepared, waiting for the client to complete it.
    TokenPreparation {
        nonce: Nonce,
        #[serde(default)]
        extra: Extra,
    },
    /// Token flow completed by the client.
    TokenCompletion {
        nonce: Nonce,
        ip: Option<String>,
        user_agent: Option<String>,
        #[serde(default)]
        extra: Extra,
    },
    /// Locally generated Demo signature.
    Demo {
        origin: String,
        ip: Option<String>,
        user_agent: Option<String>,
    },
    /// Simulated HSM signature.
    Hsm {
        certificate: String,
        #[serde(default)]
        history: Vec<HsmHistoryEntry>,
        ip: Option<String>,
        user_agent: Option<String>,
    },
    /// Attempt abandoned by its signer.
    Rejected {
        reason: Option<String>,
        previous: Box<SignatureMetadata>,
    },
}

impl SignatureMetadata {
    /// Metadata for a freshly prepared Token flow.
    pub fn token_preparation(nonce: Nonce) -> Self {
        Self::TokenPreparation {
            nonce,
            extra: Extra::new(),
        }
    }

    /// Metadata for a Demo signature.
    pub fn demo(ctx: &RequestContext) -> Self {
        Self::Demo {
            origin: DEMO_ORIGIN.to_string(),
            ip: ctx.ip.clone(),
            user_agent: ctx.user_agent.clone(),
        }
    }

    /// Metadata for a first HSM signature.
    pub fn hsm(certificate: impl Into<String>, ctx: &RequestContext) -> Self {
        Self::Hsm {
            certificate: certificate.into(),
            history: Vec::new(),
            ip: ctx.ip.clone(),
            user_agent: ctx.user_agent.clone(),
        }
    }

    /// Short label of the variant, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TokenPreparation { .. } => "token_preparation",
            Self::TokenCompletion { .. } => "token_completion",
            Self::Demo { .. } => "demo",
            Self::Hsm { .. } => "hsm",
            Self::Rejected { .. } => "rejected",
        }
    }

    /// Nonce issued during Token preparation, if any.
    pub fn nonce(&self) -> Option<&Nonce> {
        match self {
            Self::TokenPreparation { nonce, .. } | Self::TokenCompletion { nonce, .. } => {
                Some(nonce)
            }
            Self::Rejected { previous, .. } => previous.nonce(),
            _ => None,
        }
    }

    /// Open extra map, if this variant carries one.
    pub fn extra(&self) -> Option<&Extra> {
        match self {
            Self::TokenPreparation { extra, .. } | Self::TokenCompletion { extra, .. } => {
                Some(extra)
            }
            _ => None,
        }
    }

    /// Re-preparation: swap in a new nonce and keep any existing extra keys.
    pub fn reprepared(&self, nonce: Nonce) -> Self {
        Self::TokenPreparation {
            nonce,
            extra: self.extra().cloned().unwrap_or_default(),
        }
    }

    /// Completion: caller keys are merged over the stored extra map.
    ///
    /// Later keys win. The preparation nonce is kept so the completion stays
    /// bound to it.
    pub fn completed(&self, ctx: &RequestContext, caller_extra: Extra) -> crate::Result<Self> {
        let nonce = self.nonce().cloned().ok_or_else(|| {
            crate::Error::InvalidState(format!(
                "cannot complete a record carrying {} metadata",
                self.kind()
            ))
        })?;
        let mut extra = self.extra().cloned().unwrap_or_default();
        extra.extend(caller_extra);
        Ok(Self::TokenCompletion {
            nonce,
            ip: ctx.ip.clone(),
            user_agent: ctx.user_agent.clone(),
            extra,
        })
    }

    /// Rejection wraps whatever was recorded before.
    pub fn rejected(&self, reason: Option<String>) -> Self {
        Self::Rejected {
            reason,
            previous: Box::new(self.clone()),
        }
    }

    /// HSM re-sign: push the superseded signature onto the history.
    pub fn hsm_resigned(
        &self,
        certificate: impl Into<String>,
        superseded: HsmHistoryEntry,
        ctx: &RequestContext,
    ) -> Self {
        let mut history = match self {
            Self::Hsm { history, .. } => history.clone(),
            _ => Vec::new(),
        };
        history.push(superseded);
        Self::Hsm {
            certificate: certificate.into(),
            history,
            ip: ctx.ip.clone(),
            user_agent: ctx.user_agent.clone(),
        }
    }

    /// Encode for storage.
    pub fn to_json(&self) -> crate::Result<String> {
        serde_json::to_string(self).map_err(|e| crate::Error::Serialization(e.to_string()))
    }

    /// Decode from storage.
    pub fn from_json(s: &str) -> crate::Result<Self> {
        serde_json::from_str(s).map_err(|e| crate::Error::Serialization(e.to_string()))
    }
}
