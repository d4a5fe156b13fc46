//! Repository traits for metadata operations.

pub mod bootstrap;
pub mod documents;
pub mod signatures;
pub mod tokens;

pub use bootstrap::BootstrapRepo;
pub use documents::DocumentRepo;
pub use signatures::SignatureRepo;
pub use tokens::TokenRepo;
