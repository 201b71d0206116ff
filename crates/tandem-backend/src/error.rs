//! Backend error types.

use thiserror::Error;

/// Result type for backend operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// Errors that can occur while running an AI CLI.
///
/// Bad file references never show up here: the inliner replaces them with
/// text markers.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The binary could not be started.
    #[error("Failed to start {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    /// The process exited with a non-zero status.
    #[error("{binary} exited with {}: {stderr_tail}", describe_exit(.code))]
    Exit {
        binary: String,
        code: Option<i32>,
        stderr_tail: String,
    },

    /// Stdout exceeded the configured ceiling; the process was killed.
    #[error("Output exceeded {limit} bytes; process terminated")]
    OutputTooLarge { limit: usize },

    /// The provider reported quota exhaustion.
    #[error("Quota exceeded for model {model}: {message}")]
    QuotaExceeded { model: String, message: String },

    /// Both the primary and the fallback attempt failed.
    #[error("Primary model failed ({primary}); fallback model failed ({fallback})")]
    FallbackFailed { primary: String, fallback: String },

    /// The caller cancelled the invocation; the process was killed.
    #[error("Operation cancelled")]
    Cancelled,

    /// The provider's binary is not installed or not runnable.
    #[error("Backend not available: {0}")]
    NotAvailable(String),

    /// No adapter is registered for the tag.
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// IO error while talking to the child process.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {code}"),
        None => "signal".to_string(),
    }
}

impl BackendError {
    pub fn spawn(binary: impl Into<String>, source: std::io::Error) -> Self {
        Self::Spawn {
            binary: binary.into(),
            source,
        }
    }

    pub fn exit(
        binary: impl Into<String>,
        code: Option<i32>,
        stderr_tail: impl Into<String>,
    ) -> Self {
        Self::Exit {
            binary: binary.into(),
            code,
            stderr_tail: stderr_tail.into(),
        }
    }

    /// Stderr text carried by the error, if any.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            BackendError::Exit { stderr_tail, .. } => Some(stderr_tail),
            BackendError::QuotaExceeded { message, .. } => Some(message),
            _ => None,
        }
    }

    pub fn is_quota_exhausted(&self) -> bool {
        matches!(self, BackendError::QuotaExceeded { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_error_formats_code() {
        let err = BackendError::exit("gemini", Some(2), "boom");
        assert_eq!(err.to_string(), "gemini exited with code 2: boom");
        assert_eq!(err.stderr(), Some("boom"));
    }

    #[test]
    fn exit_error_formats_signal() {
        let err = BackendError::exit("codex", None, "");
        assert!(err.to_string().contains("signal"));
    }

    #[test]
    fn fallback_error_names_both_attempts() {
        let err = BackendError::FallbackFailed {
            primary: "quota".to_string(),
            fallback: "network".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("quota"));
        assert!(msg.contains("network"));
    }

    #[test]
    fn quota_detection() {
        let err = BackendError::QuotaExceeded {
            model: "gemini-2.5-pro".to_string(),
            message: "429".to_string(),
        };
        assert!(err.is_quota_exhausted());
        assert!(!BackendError::Cancelled.is_quota_exhausted());
    }
}
