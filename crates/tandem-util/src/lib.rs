//! Shared utilities for tandem.
//!
//! This crate provides common utilities used across the tandem workspace:
//! - Logging setup with tracing
//! - Path utilities (data directories, lexical normalization, `..` detection)
//! - Identifier sanitization and ULID-based generation

pub mod id;
pub mod log;
pub mod path;

pub use id::{sanitize_id, Identifier, PLACEHOLDER_ID};
