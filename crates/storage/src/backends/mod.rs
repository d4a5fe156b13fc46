//! Storage backends.

pub mod filesystem;
