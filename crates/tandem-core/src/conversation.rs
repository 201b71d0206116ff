//! One conversational round against a backend, persisted in a session.
//!
//! The flow for every request:
//! 1. Capture git state and pick the session id (explicit, or derived from
//!    branch and commit).
//! 2. Load the session and check the recorded git state still allows
//!    continuing it.
//! 3. Resolve the backend and run the prompt, resuming the provider's
//!    native thread when it has one, or re-sending recent rounds otherwise.
//! 4. Append the round, remember any new thread id, save.

use crate::session::{ConversationRecord, Round, ThreadRef};
use crate::{Config, CoreError, CoreResult};
use std::path::{Path, PathBuf};
use tandem_backend::{
    ApprovalMode, BackendConfig, BackendKind, BackendRegistry, BackendResult, ProgressSink,
    ReasoningEffort, SandboxMode,
};
use tandem_git::{Continuation, GitState, GitStateResolver};
use tandem_storage::SessionStore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How many earlier rounds are replayed for providers without threads.
pub const MAX_HISTORY_ROUNDS: usize = 10;

/// What the caller wants from one round.
#[derive(Debug, Clone, Default)]
pub struct TurnRequest {
    pub prompt: String,
    /// Session to continue; derived from git state when `None`.
    pub session_id: Option<String>,
    pub provider: Option<BackendKind>,
    pub model: Option<String>,
    pub sandbox: Option<SandboxMode>,
    pub approval: Option<ApprovalMode>,
    pub reasoning_effort: Option<ReasoningEffort>,
    pub allowed_tools: Vec<String>,
    pub change_mode: bool,
    /// Continue even if the session was recorded on another branch.
    pub force: bool,
    pub cancel: Option<CancellationToken>,
}

impl TurnRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_session(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    pub fn with_provider(mut self, provider: BackendKind) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

/// Result of a completed round.
#[derive(Debug)]
pub struct TurnOutcome<T> {
    pub result: BackendResult,
    pub session_id: String,
    /// The record as saved.
    pub record: T,
    /// Continuation warning from the git check, if any.
    pub warning: Option<String>,
    pub git: Option<GitState>,
}

/// Runs rounds for one tool's sessions.
pub struct Conversation<'a, T> {
    registry: &'a BackendRegistry,
    store: &'a SessionStore<T>,
    config: &'a Config,
    cwd: PathBuf,
}

impl<'a, T: ConversationRecord> Conversation<'a, T> {
    pub fn new(
        registry: &'a BackendRegistry,
        store: &'a SessionStore<T>,
        config: &'a Config,
        cwd: impl AsRef<Path>,
    ) -> Self {
        Self {
            registry,
            store,
            config,
            cwd: cwd.as_ref().to_path_buf(),
        }
    }

    pub async fn run(
        &self,
        request: TurnRequest,
        progress: Option<ProgressSink>,
    ) -> CoreResult<TurnOutcome<T>> {
        // Git is only mandatory when it has to supply the session id.
        let resolved = GitStateResolver::new(&self.cwd).resolve().await;
        let (session_id, git) = match (request.session_id.clone(), resolved) {
            (Some(id), Ok(state)) => (id, Some(state)),
            (Some(id), Err(e)) => {
                debug!(error = %e, "No git state; continuing with explicit session id");
                (id, None)
            }
            (None, Ok(state)) => (state.default_session_id(), Some(state)),
            (None, Err(e)) => return Err(e.into()),
        };

        let existing = self.store.load(&session_id).await?;
        let warning = match (existing.as_ref().and_then(T::recorded_git_state), &git) {
            (Some(recorded), Some(now)) => {
                let decision = now.continuation_from(recorded);
                self.check_continuation(&session_id, decision, request.force)?
            }
            _ => None,
        };
        let mut record = existing.unwrap_or_else(|| T::create(&session_id));

        let backend = match request.provider {
            Some(kind) => self.registry.get(kind).await?,
            None => self.registry.resolve(None).await?,
        };
        let kind = backend.kind();
        let model = request
            .model
            .clone()
            .or_else(|| self.config.default_model(kind));

        let mut backend_config = BackendConfig::new(kind, &self.cwd)
            .with_allowed_tools(request.allowed_tools.iter().cloned())
            .with_change_mode(request.change_mode);
        backend_config.model = model.clone();
        backend_config.sandbox = request.sandbox;
        backend_config.approval = request.approval;
        backend_config.reasoning_effort = request.reasoning_effort;
        backend_config.cancel = request.cancel.clone();

        let resumable = record
            .thread()
            .filter(|thread| backend.supports_threads() && thread.provider == kind)
            .map(|thread| thread.id.clone());
        let prompt = match resumable {
            Some(thread_id) => {
                debug!(
                    session_id = %session_id,
                    thread_id = %thread_id,
                    "Resuming provider thread"
                );
                backend_config.resume_thread_id = Some(thread_id);
                request.prompt.clone()
            }
            None => with_history(&record.rounds(), &request.prompt),
        };

        info!(
            session_id = %session_id,
            provider = %kind,
            rounds = record.rounds().len(),
            "Running conversation round"
        );
        let result = backend
            .execute(&prompt, &backend_config, progress)
            .await
            .map_err(|error| CoreError::Execution {
                provider: kind,
                model: model.clone().unwrap_or_else(|| {
                    backend.models().first().copied().unwrap_or_default().to_string()
                }),
                error,
            })?;

        record.record_round(Round::new(request.prompt, &result), git.as_ref());
        if let Some(ref thread_id) = result.thread_id {
            record.set_thread(Some(ThreadRef {
                provider: result.provider,
                id: thread_id.clone(),
            }));
        }
        self.store.save(&session_id, &mut record).await?;

        Ok(TurnOutcome {
            result,
            session_id,
            record,
            warning,
            git,
        })
    }

    fn check_continuation(
        &self,
        session_id: &str,
        decision: Continuation,
        force: bool,
    ) -> CoreResult<Option<String>> {
        match decision {
            Continuation::Continue => Ok(None),
            Continuation::ContinueWithWarning(msg) => {
                warn!(session_id = %session_id, "{}", msg);
                Ok(Some(msg))
            }
            Continuation::Deny(msg) if force => {
                warn!(session_id = %session_id, "Forcing continuation: {}", msg);
                Ok(Some(msg))
            }
            Continuation::Deny(reason) => Err(CoreError::ContinuationDenied {
                id: session_id.to_string(),
                reason,
            }),
        }
    }
}

/// Prefix `prompt` with the most recent rounds.
pub fn with_history(rounds: &[&Round], prompt: &str) -> String {
    if rounds.is_empty() {
        return prompt.to_string();
    }

    let skip = rounds.len().saturating_sub(MAX_HISTORY_ROUNDS);
    let mut out = String::from("Previous conversation:\n");
    for (i, round) in rounds.iter().enumerate().skip(skip) {
        out.push_str(&format!(
            "\n[Round {}]\nUser: {}\nAssistant: {}\n",
            i + 1,
            round.prompt,
            round.response
        ));
    }
    out.push_str("\nCurrent request:\n");
    out.push_str(prompt);
    out
}
