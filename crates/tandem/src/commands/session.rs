//! Session management command handlers.
//!
//! Handles listing, showing, deleting and clearing stored sessions.

use anyhow::Context;
use clap::Subcommand;
use tandem_core::{AskSession, BrainstormSession, Config, ReviewSession, ToolKind};
use tandem_storage::{SessionRecord, SessionStore};

/// Session subcommands.
#[derive(Subcommand)]
pub enum SessionCommands {
    /// List all sessions
    List,
    /// Show session details
    Show {
        /// Session ID
        id: String,
    },
    /// Delete a session
    Delete {
        /// Session ID
        id: String,
    },
    /// Delete every session of the tool
    Clear,
}

/// Open the store for `tool` as configured.
pub fn open_store<T: SessionRecord>(
    config: &Config,
    tool: ToolKind,
) -> anyhow::Result<SessionStore<T>> {
    let root = config
        .sessions_root()
        .context("Could not determine the sessions directory")?;
    let mut store = SessionStore::new(root, tool.as_str(), config.store_config(tool.as_str()));
    // Legacy records only live under the default location.
    if config.session_dir.is_none() {
        if let Some(legacy) = tandem_util::path::legacy_sessions_dir() {
            store = store.with_legacy_root(legacy);
        }
    }
    Ok(store)
}

/// Handle session commands.
pub async fn handle_sessions(
    tool: ToolKind,
    command: SessionCommands,
    config: &Config,
) -> anyhow::Result<()> {
    match tool {
        ToolKind::Ask => handle::<AskSession>(tool, command, config).await,
        ToolKind::Brainstorm => handle::<BrainstormSession>(tool, command, config).await,
        ToolKind::Review => handle::<ReviewSession>(tool, command, config).await,
    }
}

async fn handle<T: SessionRecord>(
    tool: ToolKind,
    command: SessionCommands,
    config: &Config,
) -> anyhow::Result<()> {
    let store = open_store::<T>(config, tool)?;

    match command {
        SessionCommands::List => {
            let sessions = store.list().await?;

            if sessions.is_empty() {
                println!("No {tool} sessions found.");
            } else {
                println!("{:<40} {:<20} {:<20} {:<20}", "ID", "CREATED", "LAST USED", "EXPIRES");
                println!("{}", "-".repeat(100));

                for session in sessions {
                    println!(
                        "{:<40} {:<20} {:<20} {:<20}",
                        session.id,
                        session.created_at.format("%Y-%m-%d %H:%M:%S"),
                        session.last_accessed_at.format("%Y-%m-%d %H:%M:%S"),
                        session.expires_at.format("%Y-%m-%d %H:%M:%S"),
                    );
                }
            }
        }
        SessionCommands::Show { id } => match store.load(&id).await? {
            Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
            None => println!("Session not found: {id}"),
        },
        SessionCommands::Delete { id } => {
            store.delete(&id).await?;
            println!("Session deleted: {id}");
        }
        SessionCommands::Clear => {
            let removed = store.clear().await?;
            println!("Removed {removed} {tool} sessions.");
        }
    }

    Ok(())
}
