//! Signature workflow for Rubrica.
//!
//! This crate provides:
//! - The signing orchestrator and its per-modality handlers (Demo, Token, HSM)
//! - Document state projection under a configurable completion policy
//! - Integrity verification of stored document bytes
//! - Minimal document registration

pub mod blob;
pub mod error;
pub mod modality;
pub mod orchestrator;
pub mod projector;
pub mod verifier;

pub use error::{ErrorKind, SigningError, SigningResult};
pub use modality::TokenPreparation;
pub use orchestrator::{NewDocument, SignatureOutcome, SigningAction, SigningService};
pub use projector::{DocumentProjector, SignatureEvent};
pub use verifier::{IntegrityVerifier, VerificationReport};
