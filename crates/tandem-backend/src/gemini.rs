//! Gemini CLI backend.
//!
//! Plain-text protocol: the prompt is the final `-p` argument and stdout is
//! the response. The CLI understands `@path` references itself, so prompts
//! are passed through untouched.
//!
//! When the primary model's quota is exhausted the call is retried once on
//! the fallback model and the substitution is reported as a progress notice.

use crate::process::{CommandRunner, Invocation};
use crate::progress::ProgressSink;
use crate::{change_mode, Backend, BackendConfig, BackendError, BackendKind, BackendResult, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

pub const DEFAULT_BINARY: &str = "gemini";
pub const PRIMARY_MODEL: &str = "gemini-2.5-pro";
pub const FALLBACK_MODEL: &str = "gemini-2.5-flash";

/// Stderr text the CLI prints when the Pro request quota is used up.
pub const QUOTA_EXCEEDED_SIGNAL: &str =
    "Quota exceeded for quota metric 'Gemini 2.5 Pro Requests'";

const MODELS: &[&str] = &[PRIMARY_MODEL, FALLBACK_MODEL];

/// Adapter for the Gemini CLI.
pub struct GeminiBackend {
    binary: String,
    fallback_model: String,
    runner: Arc<dyn CommandRunner>,
    available: OnceCell<bool>,
}

impl GeminiBackend {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            binary: DEFAULT_BINARY.to_string(),
            fallback_model: FALLBACK_MODEL.to_string(),
            runner,
            available: OnceCell::new(),
        }
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_fallback_model(mut self, model: impl Into<String>) -> Self {
        self.fallback_model = model.into();
        self
    }

    /// Build the argument vector for one attempt.
    pub fn build_args(prompt: &str, model: Option<&str>, config: &BackendConfig) -> Vec<String> {
        let mut args = Vec::new();

        if let Some(model) = model {
            args.push("-m".to_string());
            args.push(model.to_string());
        }
        if config.sandbox.is_some() {
            args.push("-s".to_string());
        }
        for tool in &config.allowed_tools {
            args.push("--allowed-tools".to_string());
            args.push(tool.clone());
        }

        args.push("-p".to_string());
        args.push(quote_for_shell(prompt));
        args
    }

    async fn attempt(
        &self,
        prompt: &str,
        model: Option<&str>,
        config: &BackendConfig,
        progress: Option<ProgressSink>,
    ) -> Result<String> {
        let invocation = Invocation::new(&self.binary)
            .args(Self::build_args(prompt, model, config))
            .cwd(&config.cwd)
            .progress(progress)
            .cancel(config.cancel.clone());

        match self.runner.run(invocation).await {
            Err(BackendError::Exit { stderr_tail, .. })
                if stderr_tail.contains(QUOTA_EXCEEDED_SIGNAL) =>
            {
                Err(BackendError::QuotaExceeded {
                    model: model.unwrap_or(PRIMARY_MODEL).to_string(),
                    message: stderr_tail,
                })
            }
            other => other,
        }
    }
}

/// Quote prompts holding `@` references where the CLI is reached through a
/// shell (Windows `.cmd` shims); elsewhere arguments are passed verbatim.
fn quote_for_shell(prompt: &str) -> String {
    let already_quoted = prompt.len() >= 2 && prompt.starts_with('"') && prompt.ends_with('"');
    if cfg!(windows) && prompt.contains('@') && !already_quoted {
        format!("\"{}\"", prompt.replace('"', "\\\""))
    } else {
        prompt.to_string()
    }
}

#[async_trait]
impl Backend for GeminiBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Gemini
    }

    async fn execute(
        &self,
        prompt: &str,
        config: &BackendConfig,
        progress: Option<ProgressSink>,
    ) -> Result<BackendResult> {
        let prompt = if config.change_mode {
            change_mode::wrap_prompt(prompt)
        } else {
            prompt.to_string()
        };

        let requested = config.model.as_deref();
        let model_name = requested.unwrap_or(PRIMARY_MODEL).to_string();
        info!(model = %model_name, prompt_len = prompt.len(), "Executing Gemini request");

        let output = match self
            .attempt(&prompt, requested, config, progress.clone())
            .await
        {
            Ok(output) => (output, model_name),
            Err(primary) if primary.is_quota_exhausted() && model_name != self.fallback_model => {
                warn!(
                    model = %model_name,
                    fallback = %self.fallback_model,
                    "Gemini quota exhausted, retrying with fallback model"
                );
                if let Some(ref sink) = progress {
                    sink.notice(format!(
                        "{model_name} quota exceeded, falling back to {}",
                        self.fallback_model
                    ));
                }
                match self
                    .attempt(&prompt, Some(&self.fallback_model), config, progress)
                    .await
                {
                    Ok(output) => (output, self.fallback_model.clone()),
                    Err(fallback) => {
                        return Err(BackendError::FallbackFailed {
                            primary: primary.to_string(),
                            fallback: fallback.to_string(),
                        })
                    }
                }
            }
            Err(e) => return Err(e),
        };

        let (response, model) = output;
        debug!(model = %model, response_len = response.len(), "Gemini request completed");
        Ok(BackendResult {
            response: response.trim().to_string(),
            provider: BackendKind::Gemini,
            model,
            thread_id: None,
        })
    }

    async fn is_available(&self) -> bool {
        *self
            .available
            .get_or_init(|| crate::probe_binary(self.runner.as_ref(), &self.binary))
            .await
    }

    fn models(&self) -> &'static [&'static str] {
        MODELS
    }

    fn supports_file_refs(&self) -> bool {
        true
    }

    fn supports_threads(&self) -> bool {
        false
    }
}

impl std::fmt::Debug for GeminiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiBackend")
            .field("binary", &self.binary)
            .field("fallback_model", &self.fallback_model)
            .finish()
    }
}
