//! Error types for git queries.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for git operations.
pub type GitResult<T> = Result<T, GitError>;

#[derive(Debug, Error)]
pub enum GitError {
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    /// A blocking query task panicked or was cancelled.
    #[error("Git query task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Not a git repository: {}", .0.display())]
    NotARepository(PathBuf),
}
