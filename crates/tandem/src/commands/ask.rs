//! The `ask` command: one round against a backend.

use super::session::open_store;
use anyhow::Context;
use clap::Args;
use std::path::Path;
use tandem_backend::change_mode::{chunk_edits, parse_edits, ChangeModeError};
use tandem_backend::{
    ApprovalMode, BackendKind, BackendRegistry, ProgressEvent, ProgressSink, ReasoningEffort,
    SandboxMode,
};
use tandem_core::{
    AskSession, BrainstormSession, Config, Conversation, ConversationRecord, CoreError,
    ReviewSession, ToolKind, TurnOutcome, TurnRequest,
};
use tandem_util::Identifier;
use tokio_util::sync::CancellationToken;

#[derive(Args)]
pub struct AskArgs {
    /// Prompt text. `@path` pulls in files from the working directory
    #[arg(required = true)]
    pub prompt: Vec<String>,

    /// Backend to use (gemini, codex)
    #[arg(short, long)]
    pub provider: Option<BackendKind>,

    /// Model override
    #[arg(short, long)]
    pub model: Option<String>,

    /// Session to continue (defaults to one derived from branch and commit)
    #[arg(short, long, conflicts_with = "new")]
    pub session: Option<String>,

    /// Start a fresh session with a generated id
    #[arg(long)]
    pub new: bool,

    /// Which tool's sessions to record the round in
    #[arg(short, long, default_value = "ask")]
    pub tool: ToolKind,

    /// Ask for machine-applicable edit blocks
    #[arg(long)]
    pub change_mode: bool,

    /// Split edit blocks into parts of at most this many characters
    #[arg(long, requires = "change_mode")]
    pub chunk_chars: Option<usize>,

    /// Continue a session recorded on another branch
    #[arg(long)]
    pub force: bool,

    #[arg(long, value_parser = parse_sandbox)]
    pub sandbox: Option<SandboxMode>,

    #[arg(long, value_parser = parse_approval)]
    pub approval: Option<ApprovalMode>,

    #[arg(long, value_parser = parse_effort)]
    pub reasoning: Option<ReasoningEffort>,

    /// Tool the backend may run without asking (repeatable)
    #[arg(long = "allow-tool")]
    pub allowed_tools: Vec<String>,

    /// Echo raw backend output to stderr as it arrives
    #[arg(long)]
    pub stream: bool,
}

fn parse_sandbox(s: &str) -> Result<SandboxMode, String> {
    [
        SandboxMode::ReadOnly,
        SandboxMode::WorkspaceWrite,
        SandboxMode::DangerFullAccess,
    ]
    .into_iter()
    .find(|m| m.as_str() == s)
    .ok_or_else(|| "expected read-only, workspace-write or danger-full-access".to_string())
}

fn parse_approval(s: &str) -> Result<ApprovalMode, String> {
    [
        ApprovalMode::Untrusted,
        ApprovalMode::OnFailure,
        ApprovalMode::OnRequest,
        ApprovalMode::Never,
        ApprovalMode::FullAuto,
    ]
    .into_iter()
    .find(|m| m.as_str() == s)
    .ok_or_else(|| "expected untrusted, on-failure, on-request, never or full-auto".to_string())
}

fn parse_effort(s: &str) -> Result<ReasoningEffort, String> {
    [
        ReasoningEffort::Minimal,
        ReasoningEffort::Low,
        ReasoningEffort::Medium,
        ReasoningEffort::High,
    ]
    .into_iter()
    .find(|e| e.as_str() == s)
    .ok_or_else(|| "expected minimal, low, medium or high".to_string())
}

/// Handle the ask command.
pub async fn handle_ask(args: AskArgs, config: &Config, cwd: &Path) -> anyhow::Result<()> {
    let registry = config.build_registry();

    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });

    let (sink, mut rx) = ProgressSink::channel();
    let stream = args.stream;
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                ProgressEvent::Notice(msg) => eprintln!("note: {msg}"),
                ProgressEvent::Output(chunk) if stream => eprint!("{chunk}"),
                ProgressEvent::Output(_) => {}
            }
        }
    });

    let session_id = if args.new {
        Some(Identifier::session())
    } else {
        args.session.clone()
    };
    let request = TurnRequest {
        prompt: args.prompt.join(" "),
        session_id,
        provider: args.provider,
        model: args.model.clone(),
        sandbox: args.sandbox,
        approval: args.approval,
        reasoning_effort: args.reasoning,
        allowed_tools: args.allowed_tools.clone(),
        change_mode: args.change_mode,
        force: args.force,
        cancel: Some(cancel),
    };

    let summary = match args.tool {
        ToolKind::Ask => {
            let outcome =
                run_turn::<AskSession>(&registry, config, cwd, args.tool, request, sink).await?;
            print_outcome(&outcome, &args);
            None
        }
        ToolKind::Brainstorm => {
            let outcome =
                run_turn::<BrainstormSession>(&registry, config, cwd, args.tool, request, sink)
                    .await?;
            print_outcome(&outcome, &args);
            Some(format!("{} ideas recorded", outcome.record.ideas.len()))
        }
        ToolKind::Review => {
            let outcome =
                run_turn::<ReviewSession>(&registry, config, cwd, args.tool, request, sink)
                    .await?;
            print_outcome(&outcome, &args);
            Some(format!(
                "{} comments pending",
                outcome.record.pending_comments().count()
            ))
        }
    };

    // The sink was dropped with the conversation, so the printer drains and exits.
    let _ = printer.await;
    if let Some(summary) = summary {
        eprintln!("{summary}");
    }
    Ok(())
}

async fn run_turn<T: ConversationRecord>(
    registry: &BackendRegistry,
    config: &Config,
    cwd: &Path,
    tool: ToolKind,
    request: TurnRequest,
    sink: ProgressSink,
) -> anyhow::Result<TurnOutcome<T>> {
    let store = open_store::<T>(config, tool)?;
    let conversation = Conversation::new(registry, &store, config, cwd);
    match conversation.run(request, Some(sink)).await {
        Err(CoreError::Git(e)) => Err(e).context(
            "No session id given and none could be derived from git; pass --session or --new",
        ),
        other => Ok(other?),
    }
}

fn print_outcome<T>(outcome: &TurnOutcome<T>, args: &AskArgs) {
    if let Some(ref warning) = outcome.warning {
        eprintln!("warning: {warning}");
    }

    if args.change_mode {
        match parse_edits(&outcome.result.response) {
            Ok(edits) => {
                let parts = chunk_edits(&edits, args.chunk_chars.unwrap_or(usize::MAX));
                let total = parts.len();
                for (i, part) in parts.iter().enumerate() {
                    if total > 1 {
                        println!("--- part {}/{} ---", i + 1, total);
                    }
                    for edit in part {
                        print!("{}", edit.render());
                    }
                }
            }
            Err(ChangeModeError::NoEdits { raw }) => {
                eprintln!("warning: response contained no edit blocks; showing it verbatim");
                println!("{raw}");
            }
        }
    } else {
        println!("{}", outcome.result.response);
    }

    eprintln!(
        "session: {} ({}/{})",
        outcome.session_id, outcome.result.provider, outcome.result.model
    );
}
