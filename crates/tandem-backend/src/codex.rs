//! Codex CLI backend.
//!
//! Structured-event protocol: the CLI runs non-interactively via `exec`
//! (or `exec resume <thread>`), reads the prompt from stdin and prints one
//! JSON event per line. The CLI has no `@path` syntax, so references are
//! inlined before the call.
//!
//! Global flags must come before the `exec` token; the CLI rejects them
//! after the subcommand.

use crate::inline::FileInliner;
use crate::process::{CommandRunner, Invocation};
use crate::progress::ProgressSink;
use crate::{
    change_mode, ApprovalMode, Backend, BackendConfig, BackendKind, BackendResult, Result,
    SandboxMode,
};
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::sync::{Arc, OnceLock};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

pub const DEFAULT_BINARY: &str = "codex";
pub const DEFAULT_MODEL: &str = "gpt-5-codex";

/// Upper bound on event lines scanned per response.
pub const MAX_EVENT_LINES: usize = 10_000;

const MODELS: &[&str] = &[DEFAULT_MODEL, "gpt-5", "o4-mini"];

/// Result of decoding a JSONL event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedEvents {
    pub response: String,
    pub thread_id: Option<String>,
    /// True when no recognised event produced text and the response came
    /// from the best-effort scrape or the raw output.
    pub degraded: bool,
}

/// Adapter for the Codex CLI.
pub struct CodexBackend {
    binary: String,
    runner: Arc<dyn CommandRunner>,
    inliner: FileInliner,
    max_event_lines: usize,
    available: OnceCell<bool>,
}

impl CodexBackend {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            binary: DEFAULT_BINARY.to_string(),
            runner,
            inliner: FileInliner::default(),
            max_event_lines: MAX_EVENT_LINES,
            available: OnceCell::new(),
        }
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_inliner(mut self, inliner: FileInliner) -> Self {
        self.inliner = inliner;
        self
    }

    pub fn with_max_event_lines(mut self, max: usize) -> Self {
        self.max_event_lines = max;
        self
    }

    /// Build the argument vector. Every flag, including `--json` and the `-`
    /// stdin marker, precedes the `exec [resume <id>]` subcommand.
    pub fn build_args(config: &BackendConfig) -> Vec<String> {
        let mut args = Vec::new();

        match config.approval {
            Some(ApprovalMode::FullAuto) => args.push("--full-auto".to_string()),
            Some(mode) => {
                args.push("-a".to_string());
                args.push(mode.as_str().to_string());
            }
            None => {}
        }

        args.push("-s".to_string());
        args.push(
            config
                .sandbox
                .unwrap_or(SandboxMode::ReadOnly)
                .as_str()
                .to_string(),
        );

        if let Some(ref model) = config.model {
            args.push("-m".to_string());
            args.push(model.clone());
        }

        if let Some(effort) = config.reasoning_effort {
            args.push("--config".to_string());
            args.push(format!("model_reasoning_effort=\"{}\"", effort.as_str()));
        }

        args.push("--json".to_string());
        args.push("-".to_string());

        args.push("exec".to_string());
        if let Some(ref thread_id) = config.resume_thread_id {
            args.push("resume".to_string());
            args.push(thread_id.clone());
        }
        args
    }
}

static TEXT_FIELD: OnceLock<Regex> = OnceLock::new();

fn text_field_regex() -> &'static Regex {
    TEXT_FIELD.get_or_init(|| {
        Regex::new(r#""text"\s*:\s*"((?:[^"\\]|\\.)*)""#)
            .expect("Invalid regex pattern - this is a compile-time constant")
    })
}

/// Text carried by a message-like event, if any.
fn event_text(event: &Value) -> Option<String> {
    let kind = event.get("type")?.as_str()?;
    let text = match kind {
        "item.agent_message" | "item.message" | "turn.completed" => event
            .get("text")
            .or_else(|| event.get("message"))
            .or_else(|| event.get("item").and_then(|item| item.get("text")))
            .or_else(|| event.get("last_agent_message")),
        "item.completed" => {
            let item = event.get("item")?;
            match item.get("type").and_then(Value::as_str) {
                Some("agent_message") | Some("message") => item.get("text"),
                _ => None,
            }
        }
        _ => None,
    }?;
    text.as_str()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Decode the Codex JSONL event stream.
///
/// `thread.started` supplies the thread id; message events contribute
/// text in order. When nothing recognisable yields text, any `"text": "..."`
/// literals are scraped, and failing that the raw output is returned. The
/// scrape is lossy and only meant as a degraded mode.
pub fn decode_events(raw: &str, max_lines: usize) -> DecodedEvents {
    let mut thread_id = None;
    let mut chunks: Vec<String> = Vec::new();

    for line in raw.lines().take(max_lines) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let event: Value = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(e) => {
                debug!(
                    error = %e,
                    line_preview = %line.chars().take(100).collect::<String>(),
                    "Skipping non-JSON line"
                );
                continue;
            }
        };

        if event.get("type").and_then(Value::as_str) == Some("thread.started") {
            if let Some(id) = event.get("thread_id").and_then(Value::as_str) {
                debug!(thread_id = %id, "Captured Codex thread id");
                thread_id = Some(id.to_string());
            }
            continue;
        }

        if let Some(text) = event_text(&event) {
            chunks.push(text);
        }
    }

    let response = chunks.join("\n").trim().to_string();
    if !response.is_empty() {
        return DecodedEvents {
            response,
            thread_id,
            degraded: false,
        };
    }

    let scraped: Vec<String> = text_field_regex()
        .captures_iter(raw)
        .filter_map(|caps| caps.get(1))
        .map(|m| {
            serde_json::from_str::<String>(&format!("\"{}\"", m.as_str()))
                .unwrap_or_else(|_| m.as_str().to_string())
        })
        .filter(|t| !t.trim().is_empty())
        .collect();
    let scraped = scraped.join("\n").trim().to_string();

    warn!(
        scraped = !scraped.is_empty(),
        "No recognised Codex message events; using degraded extraction"
    );
    DecodedEvents {
        response: if scraped.is_empty() {
            raw.trim().to_string()
        } else {
            scraped
        },
        thread_id,
        degraded: true,
    }
}

#[async_trait]
impl Backend for CodexBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Codex
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
        let prompt = self.inliner.inline(&prompt, &config.cwd).await;

        let args = Self::build_args(config);
        info!(
            model = ?config.model,
            resume = ?config.resume_thread_id,
            prompt_len = prompt.len(),
            "Executing Codex request"
        );

        let invocation = Invocation::new(&self.binary)
            .args(args)
            .stdin(prompt)
            .cwd(&config.cwd)
            .progress(progress)
            .cancel(config.cancel.clone());
        let raw = self.runner.run(invocation).await?;

        let decoded = decode_events(&raw, self.max_event_lines);
        let thread_id = decoded
            .thread_id
            .or_else(|| config.resume_thread_id.clone());

        Ok(BackendResult {
            response: decoded.response,
            provider: BackendKind::Codex,
            model: config
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            thread_id,
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
        false
    }

    fn supports_threads(&self) -> bool {
        true
    }
}

impl std::fmt::Debug for CodexBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodexBackend")
            .field("binary", &self.binary)
            .field("max_event_lines", &self.max_event_lines)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedRunner;
    use crate::ReasoningEffort;

    const FIXTURE: &str = r#"{"type":"thread.started","thread_id":"thread-123"}
{"type":"item.agent_message","text":"FIRST_OK"}
{"type":"turn.started"}
{"type":"item.agent_message","text":"SECOND_OK"}
"#;

    fn position(args: &[String], token: &str) -> usize {
        args.iter()
            .position(|a| a == token)
            .unwrap_or_else(|| panic!("missing {token} in {args:?}"))
    }

    #[test]
    fn decodes_thread_and_messages() {
        let decoded = decode_events(FIXTURE, MAX_EVENT_LINES);
        assert_eq!(decoded.thread_id.as_deref(), Some("thread-123"));
        assert_eq!(decoded.response, "FIRST_OK\nSECOND_OK");
        assert!(!decoded.degraded);
    }

    #[test]
    fn decodes_item_completed_events() {
        let raw = r#"{"type":"thread.started","thread_id":"t-9"}
{"type":"item.completed","item":{"id":"item_0","type":"reasoning","text":"thinking"}}
{"type":"item.completed","item":{"id":"item_1","type":"agent_message","text":"done"}}
{"type":"turn.completed","usage":{"input_tokens":10,"output_tokens":2}}
"#;
        let decoded = decode_events(raw, MAX_EVENT_LINES);
        assert_eq!(decoded.response, "done");
        assert_eq!(decoded.thread_id.as_deref(), Some("t-9"));
    }

    #[test]
    fn line_cap_bounds_scanning() {
        let decoded = decode_events(FIXTURE, 2);
        assert_eq!(decoded.response, "FIRST_OK");
    }

    #[test]
    fn malformed_output_degrades_to_scrape() {
        let raw = r#"garbage {"type":"weird","text":"salvaged words"} trailing"#;
        let decoded = decode_events(raw, MAX_EVENT_LINES);
        assert!(decoded.degraded);
        assert!(!decoded.response.is_empty());
    }

    #[test]
    fn unrecognised_output_returns_raw() {
        let decoded = decode_events("plain text answer\n", MAX_EVENT_LINES);
        assert!(decoded.degraded);
        assert_eq!(decoded.response, "plain text answer");
    }

    #[test]
    fn global_flags_precede_exec() {
        let config = BackendConfig::new(BackendKind::Codex, "/work")
            .with_approval(ApprovalMode::OnRequest)
            .with_sandbox(SandboxMode::WorkspaceWrite)
            .with_reasoning_effort(ReasoningEffort::High);
        let args = CodexBackend::build_args(&config);

        let exec = position(&args, "exec");
        assert!(position(&args, "-a") < exec);
        assert!(position(&args, "-s") < exec);
        assert!(position(&args, "--config") < exec);
        assert_eq!(args[position(&args, "-a") + 1], "on-request");
        assert_eq!(args[position(&args, "-s") + 1], "workspace-write");
        assert_eq!(
            args[position(&args, "--config") + 1],
            "model_reasoning_effort=\"high\""
        );
        assert!(position(&args, "--json") < exec);
        assert!(position(&args, "-") < exec);
        assert_eq!(args.last().map(String::as_str), Some("exec"));
        assert!(!args.contains(&"resume".to_string()));
    }

    #[test]
    fn resume_follows_exec() {
        let config =
            BackendConfig::new(BackendKind::Codex, "/work").with_resume_thread("thread-123");
        let args = CodexBackend::build_args(&config);

        let exec = position(&args, "exec");
        assert_eq!(args[exec + 1], "resume");
        assert_eq!(args[exec + 2], "thread-123");
        assert_eq!(args.len(), exec + 3);
        assert!(position(&args, "--json") < exec);
        assert_eq!(args.iter().filter(|a| *a == "resume").count(), 1);
    }

    #[test]
    fn full_auto_replaces_approval_flag() {
        let config =
            BackendConfig::new(BackendKind::Codex, "/work").with_approval(ApprovalMode::FullAuto);
        let args = CodexBackend::build_args(&config);
        assert!(position(&args, "--full-auto") < position(&args, "exec"));
        assert!(!args.contains(&"-a".to_string()));
        assert_eq!(args[position(&args, "-s") + 1], "read-only");
    }

    #[tokio::test]
    async fn execute_sends_inlined_prompt_on_stdin() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.md"), "NOTE_BODY").unwrap();

        let runner = Arc::new(ScriptedRunner::new(vec![Ok(FIXTURE.to_string())]));
        let backend = CodexBackend::new(runner.clone());
        let config = BackendConfig::new(BackendKind::Codex, dir.path());

        let result = backend
            .execute("summarize @notes.md", &config, None)
            .await
            .unwrap();
        assert_eq!(result.response, "FIRST_OK\nSECOND_OK");
        assert_eq!(result.thread_id.as_deref(), Some("thread-123"));
        assert_eq!(result.model, DEFAULT_MODEL);

        let calls = runner.calls();
        let stdin = calls[0].stdin.as_deref().unwrap();
        assert!(stdin.contains("NOTE_BODY"));
        assert!(!stdin.contains("@notes.md"));
    }

    #[tokio::test]
    async fn resumed_call_keeps_thread_when_not_reannounced() {
        let runner = Arc::new(ScriptedRunner::new(vec![Ok(
            r#"{"type":"item.agent_message","text":"again"}"#.to_string(),
        )]));
        let backend = CodexBackend::new(runner);
        let config = BackendConfig::new(BackendKind::Codex, "/work").with_resume_thread("t-1");

        let result = backend.execute("continue", &config, None).await.unwrap();
        assert_eq!(result.thread_id.as_deref(), Some("t-1"));
    }
}
