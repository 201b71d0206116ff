//! Identifier utilities.
//!
//! Session identifiers arrive from callers or are derived from git branch
//! names, so they are sanitized before being used as file names.
//! Generated identifiers follow the pattern `prefix_ulid`, e.g. `ses_01hqxyz...`.

use ulid::Ulid;

/// Maximum length of a sanitized identifier.
pub const MAX_ID_LEN: usize = 128;

/// Identifier used when sanitization leaves nothing behind.
pub const PLACEHOLDER_ID: &str = "session";

/// Reduce an arbitrary string to a file-name-safe identifier.
///
/// Only ASCII alphanumerics, `-` and `_` survive. Every other character
/// becomes `-`, runs of separators collapse to the first one, separators are
/// trimmed from both ends and the result is capped at [`MAX_ID_LEN`].
pub fn sanitize_id(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len().min(MAX_ID_LEN));
    let mut last_sep = false;

    for c in raw.chars() {
        let mapped = if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
            c
        } else {
            '-'
        };
        let is_sep = mapped == '-' || mapped == '_';
        if is_sep && last_sep {
            continue;
        }
        last_sep = is_sep;
        out.push(mapped);
    }

    let trimmed = out.trim_matches(|c| c == '-' || c == '_');
    let capped: String = trimmed.chars().take(MAX_ID_LEN).collect();

    if capped.is_empty() {
        PLACEHOLDER_ID.to_string()
    } else {
        capped
    }
}

/// Known identifier prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdPrefix {
    Session,
    Idea,
}

impl IdPrefix {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdPrefix::Session => "ses",
            IdPrefix::Idea => "idea",
        }
    }
}

/// Identifier generation utilities.
pub struct Identifier;

impl Identifier {
    /// Generate a new ascending identifier (newer = larger).
    pub fn ascending(prefix: IdPrefix) -> String {
        Self::with_ulid(prefix, Ulid::new())
    }

    /// Generate an identifier with a specific ULID (for testing or imports).
    pub fn with_ulid(prefix: IdPrefix, ulid: Ulid) -> String {
        format!("{}_{}", prefix.as_str(), ulid.to_string().to_lowercase())
    }

    /// Generate a fresh session identifier.
    pub fn session() -> String {
        Self::ascending(IdPrefix::Session)
    }
}
