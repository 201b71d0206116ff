//! Error types for the core crate.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Configuration error.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// A backend could not be resolved.
    #[error(transparent)]
    Backend(#[from] tandem_backend::BackendError),

    /// The backend call itself failed. Carries the provider and model in
    /// use so they can be shown next to the message.
    #[error("{error}")]
    Execution {
        provider: tandem_backend::BackendKind,
        model: String,
        error: tandem_backend::BackendError,
    },

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] tandem_storage::StorageError),

    /// Git state could not be resolved.
    #[error("git error: {0}")]
    Git(#[from] tandem_git::GitError),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The stored session belongs to another branch and the caller did not
    /// force continuation.
    #[error("session '{id}' cannot be continued: {reason}")]
    ContinuationDenied { id: String, reason: String },

    /// No review comment with this id.
    #[error("comment not found: {0}")]
    CommentNotFound(String),

    /// No idea with this id.
    #[error("idea not found: {0}")]
    IdeaNotFound(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),
}

/// Configuration-specific errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid JSON/JSONC syntax.
    #[error("invalid config at {path}: {message}")]
    InvalidJson { path: String, message: String },

    /// An environment override has a value that cannot be used.
    #[error("invalid value for {name}: {value}")]
    InvalidEnv { name: String, value: String },
}

impl CoreError {
    /// Provider and model of a failed backend call.
    pub fn backend_context(&self) -> Option<(tandem_backend::BackendKind, &str)> {
        match self {
            CoreError::Execution {
                provider, model, ..
            } => Some((*provider, model.as_str())),
            _ => None,
        }
    }
}
