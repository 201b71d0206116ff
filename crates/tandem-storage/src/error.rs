//! Storage error types.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
///
/// Corrupt session files are not represented here: they are deleted and
/// reported as absent.
#[derive(Debug, Error)]
pub enum StorageError {
    /// IO error (permission denied, disk full, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error while writing a record
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The tool's storage directory could not be created
    #[error("Failed to initialize session directory {}: {source}", path.display())]
    DirectoryInit {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    pub fn directory_init(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::DirectoryInit {
            path: path.into(),
            source,
        }
    }
}
