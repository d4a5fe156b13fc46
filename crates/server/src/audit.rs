//! Audit hook for completed signing operations.
//!
//! Handlers call the sink only after a response body has been built, so an
//! audit event always describes a change that was committed.

use rubrica_core::{DocumentId, SignatureId};
use std::fmt;

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    DocumentRegistered,
    SignatureDemo,
    SignatureHsm,
    TokenPrepared,
    TokenCompleted,
    TokenRejected,
    TokenCreated,
    TokenRevoked,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::DocumentRegistered => "document_registered",
            AuditAction::SignatureDemo => "signature_demo",
            AuditAction::SignatureHsm => "signature_hsm",
            AuditAction::TokenPrepared => "token_prepared",
            AuditAction::TokenCompleted => "token_completed",
            AuditAction::TokenRejected => "token_rejected",
            AuditAction::TokenCreated => "token_created",
            AuditAction::TokenRevoked => "token_revoked",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One auditable event.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub action: AuditAction,
    /// Token subject that performed the action.
    pub actor: String,
    pub document_id: Option<DocumentId>,
    pub signature_id: Option<SignatureId>,
    pub ip: Option<String>,
    pub trace_id: Option<String>,
    /// Free-form detail, e.g. the resulting document state.
    pub detail: Option<String>,
}

impl AuditEvent {
    pub fn new(action: AuditAction, actor: impl Into<String>) -> Self {
        Self {
            action,
            actor: actor.into(),
            document_id: None,
            signature_id: None,
            ip: None,
            trace_id: None,
            detail: None,
        }
    }

    pub fn document(mut self, id: DocumentId) -> Self {
        self.document_id = Some(id);
        self
    }

    pub fn signature(mut self, id: SignatureId) -> Self {
        self.signature_id = Some(id);
        self
    }

    pub fn ip(mut self, ip: Option<String>) -> Self {
        self.ip = ip;
        self
    }

    pub fn trace_id(mut self, trace_id: Option<String>) -> Self {
        self.trace_id = trace_id;
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Destination for audit events.
///
/// Recording is fire-and-forget: a sink must not fail the request.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Writes audit events as structured `tracing` events on the
/// `rubrica::audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        tracing::info!(
            target: "rubrica::audit",
            action = %event.action,
            actor = %event.actor,
            document_id = event.document_id.map(tracing::field::display),
            signature_id = event.signature_id.map(tracing::field::display),
            ip = event.ip.as_deref(),
            trace_id = event.trace_id.as_deref(),
            detail = event.detail.as_deref(),
            "audit"
        );
    }
}
