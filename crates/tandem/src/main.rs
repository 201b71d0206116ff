//! Tandem - run prompts through AI command-line assistants.
//!
//! This is the main entry point for the tandem CLI.

mod commands;

use clap::{Parser, Subcommand};
use commands::{AskArgs, SessionCommands};
use std::path::PathBuf;
use std::process::ExitCode;
use tandem_core::{Config, CoreError, ToolKind};
use tracing::debug;

#[derive(Parser)]
#[command(name = "tandem")]
#[command(author, version, long_about = None)]
#[command(about = "Run prompts through the Gemini and Codex CLIs")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Working directory (defaults to the current directory)
    #[arg(short = 'C', long, global = true)]
    cwd: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a prompt to a backend and record the round in a session
    Ask(AskArgs),

    /// Manage stored sessions
    Sessions {
        /// Tool whose sessions to manage
        #[arg(short, long, default_value = "ask")]
        tool: ToolKind,

        #[command(subcommand)]
        command: SessionCommands,
    },

    /// Show configured backends and whether their CLIs are installed
    Backends,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    commands::init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", format_error(&e));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let cwd = match cli.cwd {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    let (config, sources) = Config::load(Some(&cwd)).await?;
    debug!(cwd = %cwd.display(), sources = ?sources, "Starting tandem");

    match cli.command {
        Commands::Ask(args) => commands::handle_ask(args, &config, &cwd).await,
        Commands::Sessions { tool, command } => {
            commands::handle_sessions(tool, command, &config).await
        }
        Commands::Backends => commands::handle_backends(&config).await,
    }
}

/// Render an error for the terminal, naming the backend that was in use.
fn format_error(err: &anyhow::Error) -> String {
    match err
        .downcast_ref::<CoreError>()
        .and_then(CoreError::backend_context)
    {
        Some((provider, model)) => format!("error [{provider}/{model}]: {err:#}"),
        None => format!("error: {err:#}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use tandem_backend::{BackendError, BackendKind};

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_ask_with_provider() {
        let cli = Cli::try_parse_from([
            "tandem", "ask", "-p", "codex", "--session", "s1", "explain", "this",
        ])
        .unwrap();
        match cli.command {
            Commands::Ask(args) => {
                assert_eq!(args.provider, Some(BackendKind::Codex));
                assert_eq!(args.session.as_deref(), Some("s1"));
                assert_eq!(args.prompt, vec!["explain", "this"]);
            }
            _ => panic!("expected ask"),
        }
    }

    #[test]
    fn rejects_unknown_provider() {
        assert!(Cli::try_parse_from(["tandem", "ask", "-p", "claude", "hi"]).is_err());
    }

    #[test]
    fn backend_errors_name_provider_and_model() {
        let err = anyhow::Error::new(CoreError::Execution {
            provider: BackendKind::Gemini,
            model: "gemini-2.5-flash".into(),
            error: BackendError::exit("gemini", Some(1), "quota"),
        });
        let rendered = format_error(&err);
        assert!(rendered.starts_with("error [gemini/gemini-2.5-flash]: "));
        assert!(rendered.contains("quota"));
    }

    #[test]
    fn other_errors_are_plain() {
        let err = anyhow::anyhow!("no data directory");
        assert_eq!(format_error(&err), "error: no data directory");
    }
}
