//! Core of tandem.
//!
//! This crate ties the backends to persisted sessions:
//! - Configuration loading and merging
//! - Per-tool session records (ask, brainstorm, review)
//! - Review comment parsing and lifecycle
//! - The conversation flow that runs one round against a backend

pub mod config;
pub mod conversation;
pub mod error;
pub mod review;
pub mod session;

pub use config::Config;
pub use conversation::{Conversation, TurnOutcome, TurnRequest};
pub use error::{ConfigError, CoreError, CoreResult};
pub use review::{parse_review_comments, CommentStatus, LineRange, ReviewComment, Severity};
pub use session::{
    AskSession, BrainstormSession, ConversationRecord, Idea, IdeaStatus, ReviewRound,
    ReviewSession, Round, ThreadRef, ToolKind,
};
