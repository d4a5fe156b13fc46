//! HTTP API server for Rubrica.
//!
//! This crate provides the HTTP surface of the signature workflow:
//! - Document registration and lookup
//! - Demo, HSM and Token signing endpoints
//! - Integrity verification reports
//! - Token administration and discovery endpoints

pub mod audit;
pub mod auth;
pub mod bootstrap;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod routes;
pub mod state;

pub use audit::{AuditEvent, AuditSink, TracingAuditSink};
pub use auth::TraceId;
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
