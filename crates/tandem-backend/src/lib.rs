//! AI CLI backends for tandem.
//!
//! Each backend wraps one external command-line assistant:
//! - Gemini (plain-text output, native `@path` references, quota fallback)
//! - Codex (JSONL event stream, inlined file references, thread resume)
//!
//! Backends never talk to a process directly; they hand an [`Invocation`]
//! to a [`CommandRunner`], which is [`ProcessInvoker`] in production.

pub mod change_mode;
pub mod codex;
pub mod env;
pub mod error;
pub mod gemini;
pub mod inline;
pub mod process;
pub mod progress;
pub mod registry;
pub mod types;

// Scripted runner for tests
pub mod testing;

pub use change_mode::{ChangeEdit, ChangeModeError};
pub use codex::CodexBackend;
pub use error::{BackendError, Result};
pub use gemini::GeminiBackend;
pub use inline::{FileInliner, InlineLimits};
pub use process::{CommandRunner, Invocation, ProcessInvoker};
pub use progress::{ProgressEvent, ProgressSink};
pub use registry::BackendRegistry;
pub use types::{
    ApprovalMode, BackendConfig, BackendKind, BackendResult, ReasoningEffort, SandboxMode,
};

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// A provider adapter.
///
/// Adapters are stateless between calls apart from a cached availability
/// probe; everything a call needs travels in [`BackendConfig`].
#[async_trait]
pub trait Backend: Send + Sync {
    /// Which provider this adapter speaks to.
    fn kind(&self) -> BackendKind;

    /// Run one prompt and return the normalized result.
    ///
    /// Output chunks and notices are forwarded to `progress` when given.
    async fn execute(
        &self,
        prompt: &str,
        config: &BackendConfig,
        progress: Option<ProgressSink>,
    ) -> Result<BackendResult>;

    /// Whether the CLI is installed and runnable.
    async fn is_available(&self) -> bool;

    /// Known model names, default first.
    fn models(&self) -> &'static [&'static str];

    /// Whether the CLI resolves `@path` references itself.
    fn supports_file_refs(&self) -> bool;

    /// Whether the provider can resume a thread by id.
    fn supports_threads(&self) -> bool {
        false
    }
}

/// A shared backend for dynamic dispatch.
pub type BoxedBackend = Arc<dyn Backend>;

/// Run `<binary> --version` and report whether it succeeded.
pub(crate) async fn probe_binary(runner: &dyn CommandRunner, binary: &str) -> bool {
    let invocation = Invocation::new(binary).args(["--version"]);
    match runner.run(invocation).await {
        Ok(version) => {
            debug!(binary = %binary, version = %version.trim(), "Backend binary available");
            true
        }
        Err(e) => {
            debug!(binary = %binary, error = %e, "Backend binary not available");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedRunner;

    #[tokio::test]
    async fn probe_runs_version_flag() {
        let runner = ScriptedRunner::new(vec![Ok("gemini 0.9.0\n".to_string())]);
        assert!(probe_binary(&runner, "gemini").await);
        let calls = runner.calls();
        assert_eq!(calls[0].binary, "gemini");
        assert_eq!(calls[0].args, vec!["--version"]);
    }

    #[tokio::test]
    async fn probe_failure_means_unavailable() {
        let runner = ScriptedRunner::new(vec![Err(BackendError::spawn(
            "codex",
            std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        ))]);
        assert!(!probe_binary(&runner, "codex").await);
    }

    #[tokio::test]
    async fn availability_is_cached() {
        let runner = Arc::new(ScriptedRunner::new(vec![Ok("1.0".to_string())]));
        let backend = GeminiBackend::new(runner.clone());
        assert!(backend.is_available().await);
        assert!(backend.is_available().await);
        assert_eq!(runner.calls().len(), 1);
    }
}
