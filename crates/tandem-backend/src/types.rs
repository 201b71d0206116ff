//! Request and result types shared by all backends.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tokio_util::sync::CancellationToken;

/// Which AI CLI handles a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Gemini,
    Codex,
}

impl BackendKind {
    pub const ALL: [BackendKind; 2] = [BackendKind::Gemini, BackendKind::Codex];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Gemini => "gemini",
            BackendKind::Codex => "codex",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = crate::BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(BackendKind::Gemini),
            "codex" => Ok(BackendKind::Codex),
            other => Err(crate::BackendError::UnknownProvider(other.to_string())),
        }
    }
}

/// Filesystem sandbox requested from the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SandboxMode {
    #[default]
    ReadOnly,
    WorkspaceWrite,
    DangerFullAccess,
}

impl SandboxMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SandboxMode::ReadOnly => "read-only",
            SandboxMode::WorkspaceWrite => "workspace-write",
            SandboxMode::DangerFullAccess => "danger-full-access",
        }
    }
}

/// When the CLI should ask before running commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApprovalMode {
    Untrusted,
    OnFailure,
    OnRequest,
    Never,
    /// Shorthand for low-friction sandboxed automatic execution.
    FullAuto,
}

impl ApprovalMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalMode::Untrusted => "untrusted",
            ApprovalMode::OnFailure => "on-failure",
            ApprovalMode::OnRequest => "on-request",
            ApprovalMode::Never => "never",
            ApprovalMode::FullAuto => "full-auto",
        }
    }
}

/// Reasoning effort for models that support it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Minimal,
    Low,
    Medium,
    High,
}

impl ReasoningEffort {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasoningEffort::Minimal => "minimal",
            ReasoningEffort::Low => "low",
            ReasoningEffort::Medium => "medium",
            ReasoningEffort::High => "high",
        }
    }
}

/// Per-call settings. Built fresh by the caller for every request.
#[derive(Debug, Clone, Default)]
pub struct BackendConfig {
    pub provider: BackendKind,
    /// Model override; `None` uses the backend's default.
    pub model: Option<String>,
    /// `None` means no sandbox for Gemini and read-only for Codex.
    pub sandbox: Option<SandboxMode>,
    pub approval: Option<ApprovalMode>,
    pub cwd: PathBuf,
    /// Tools the CLI may run without asking (Gemini `--allowed-tools`).
    pub allowed_tools: Vec<String>,
    pub reasoning_effort: Option<ReasoningEffort>,
    /// Provider-native thread to continue.
    pub resume_thread_id: Option<String>,
    /// Ask for machine-applicable edit blocks instead of prose.
    pub change_mode: bool,
    pub cancel: Option<CancellationToken>,
}

impl BackendConfig {
    pub fn new(provider: BackendKind, cwd: impl Into<PathBuf>) -> Self {
        Self {
            provider,
            cwd: cwd.into(),
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_sandbox(mut self, sandbox: SandboxMode) -> Self {
        self.sandbox = Some(sandbox);
        self
    }

    pub fn with_approval(mut self, approval: ApprovalMode) -> Self {
        self.approval = Some(approval);
        self
    }

    pub fn with_reasoning_effort(mut self, effort: ReasoningEffort) -> Self {
        self.reasoning_effort = Some(effort);
        self
    }

    pub fn with_resume_thread(mut self, thread_id: impl Into<String>) -> Self {
        self.resume_thread_id = Some(thread_id.into());
        self
    }

    pub fn with_allowed_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_change_mode(mut self, enabled: bool) -> Self {
        self.change_mode = enabled;
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Normalized outcome of one `execute` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendResult {
    pub response: String,
    pub provider: BackendKind,
    /// Model actually used; differs from the request after a fallback.
    pub model: String,
    /// Provider-assigned thread id, for providers with native resume.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}
