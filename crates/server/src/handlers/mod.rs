//! HTTP request handlers.

pub mod admin;
pub mod auth;
pub mod capabilities;
pub mod documents;
pub mod signatures;

pub use admin::*;
pub use auth::*;
pub use capabilities::*;
pub use documents::*;
pub use signatures::*;
