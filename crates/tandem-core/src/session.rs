//! Per-tool session records.
//!
//! Every record embeds [`SessionMeta`] and an ordered list of rounds. The
//! store owns the persisted copy; callers load a record, mutate it for one
//! request and save it back.

use crate::review::{parse_review_comments, CommentStatus, ReviewComment};
use crate::{CoreError, CoreResult};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use tandem_backend::{BackendKind, BackendResult};
use tandem_git::GitState;
use tandem_storage::{SessionMeta, SessionRecord};
use tandem_util::id::{IdPrefix, Identifier};

/// The tools that keep sessions. Each gets its own store directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    Ask,
    Brainstorm,
    Review,
}

impl ToolKind {
    pub const ALL: [ToolKind; 3] = [ToolKind::Ask, ToolKind::Brainstorm, ToolKind::Review];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::Ask => "ask",
            ToolKind::Brainstorm => "brainstorm",
            ToolKind::Review => "review",
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ToolKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CoreError::UnknownTool(s.to_string()))
    }
}

/// One request/response exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Round {
    pub prompt: String,
    pub response: String,
    pub provider: BackendKind,
    pub model: String,
    pub timestamp: DateTime<Utc>,
}

impl Round {
    pub fn new(prompt: impl Into<String>, result: &BackendResult) -> Self {
        Self {
            prompt: prompt.into(),
            response: result.response.clone(),
            provider: result.provider,
            model: result.model.clone(),
            timestamp: Utc::now(),
        }
    }
}

/// A provider-native thread a session can resume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadRef {
    pub provider: BackendKind,
    pub id: String,
}

/// Behaviour the conversation flow needs from any session record.
pub trait ConversationRecord: SessionRecord {
    /// A fresh, empty record.
    fn create(id: &str) -> Self;

    fn rounds(&self) -> Vec<&Round>;

    fn thread(&self) -> Option<&ThreadRef>;

    fn set_thread(&mut self, thread: Option<ThreadRef>);

    /// Append a completed round. `git` is the state the round ran against.
    fn record_round(&mut self, round: Round, git: Option<&GitState>);

    /// Git state the session was last recorded at, for records that keep one.
    fn recorded_git_state(&self) -> Option<&GitState> {
        None
    }
}

/// Free-form question and answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AskSession {
    #[serde(flatten)]
    pub meta: SessionMeta,
    #[serde(default)]
    pub rounds: Vec<Round>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread: Option<ThreadRef>,
}

impl SessionRecord for AskSession {
    fn meta(&self) -> &SessionMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut SessionMeta {
        &mut self.meta
    }
}

impl ConversationRecord for AskSession {
    fn create(id: &str) -> Self {
        Self {
            meta: SessionMeta::new(id),
            rounds: Vec::new(),
            thread: None,
        }
    }

    fn rounds(&self) -> Vec<&Round> {
        self.rounds.iter().collect()
    }

    fn thread(&self) -> Option<&ThreadRef> {
        self.thread.as_ref()
    }

    fn set_thread(&mut self, thread: Option<ThreadRef>) {
        self.thread = thread;
    }

    fn record_round(&mut self, round: Round, _git: Option<&GitState>) {
        self.rounds.push(round);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdeaStatus {
    #[default]
    Proposed,
    Explored,
    Selected,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Idea {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub status: IdeaStatus,
    /// Round the idea first appeared in (1-based).
    pub round: u32,
}

/// Brainstorming rounds plus a registry of the ideas they produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrainstormSession {
    #[serde(flatten)]
    pub meta: SessionMeta,
    #[serde(default)]
    pub rounds: Vec<Round>,
    #[serde(default)]
    pub ideas: Vec<Idea>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread: Option<ThreadRef>,
}

static IDEA_LINE: OnceLock<Regex> = OnceLock::new();

fn idea_regex() -> &'static Regex {
    IDEA_LINE.get_or_init(|| {
        Regex::new(r"^(\d+)[.)]\s+(.+)$")
            .expect("Invalid regex pattern - this is a compile-time constant")
    })
}

/// Top-level numbered list items in a response. Nested items are skipped.
pub fn extract_ideas(response: &str) -> Vec<String> {
    response
        .lines()
        .filter_map(|line| idea_regex().captures(line.trim_end()))
        .map(|caps| caps[2].replace("**", "").trim().to_string())
        .filter(|text| !text.is_empty())
        .collect()
}

impl BrainstormSession {
    /// Register an idea unless one with the same text exists. Returns its id.
    pub fn add_idea(&mut self, text: &str, round: u32) -> String {
        let text = text.trim();
        if let Some(existing) = self
            .ideas
            .iter()
            .find(|idea| idea.text.eq_ignore_ascii_case(text))
        {
            return existing.id.clone();
        }
        let id = Identifier::ascending(IdPrefix::Idea);
        self.ideas.push(Idea {
            id: id.clone(),
            text: text.to_string(),
            status: IdeaStatus::Proposed,
            round,
        });
        id
    }

    pub fn set_idea_status(&mut self, id: &str, status: IdeaStatus) -> CoreResult<()> {
        let idea = self
            .ideas
            .iter_mut()
            .find(|idea| idea.id == id)
            .ok_or_else(|| CoreError::IdeaNotFound(id.to_string()))?;
        idea.status = status;
        Ok(())
    }

    pub fn ideas_with_status(&self, status: IdeaStatus) -> impl Iterator<Item = &Idea> {
        self.ideas.iter().filter(move |idea| idea.status == status)
    }
}

impl SessionRecord for BrainstormSession {
    fn meta(&self) -> &SessionMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut SessionMeta {
        &mut self.meta
    }
}

impl ConversationRecord for BrainstormSession {
    fn create(id: &str) -> Self {
        Self {
            meta: SessionMeta::new(id),
            rounds: Vec::new(),
            ideas: Vec::new(),
            thread: None,
        }
    }

    fn rounds(&self) -> Vec<&Round> {
        self.rounds.iter().collect()
    }

    fn thread(&self) -> Option<&ThreadRef> {
        self.thread.as_ref()
    }

    fn set_thread(&mut self, thread: Option<ThreadRef>) {
        self.thread = thread;
    }

    fn record_round(&mut self, round: Round, _git: Option<&GitState>) {
        let number = self.rounds.len() as u32 + 1;
        for text in extract_ideas(&round.response) {
            self.add_idea(&text, number);
        }
        self.rounds.push(round);
    }
}

/// A review round with the git state it was run against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRound {
    #[serde(flatten)]
    pub round: Round,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git: Option<GitState>,
}

/// Review rounds and every comment they raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewSession {
    #[serde(flatten)]
    pub meta: SessionMeta,
    #[serde(default)]
    pub rounds: Vec<ReviewRound>,
    #[serde(default)]
    pub comments: Vec<ReviewComment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread: Option<ThreadRef>,
}

impl ReviewSession {
    /// Record the caller's decision on a comment.
    pub fn apply_decision(
        &mut self,
        comment_id: &str,
        status: CommentStatus,
        note: Option<String>,
    ) -> CoreResult<()> {
        let comment = self
            .comments
            .iter_mut()
            .find(|c| c.id == comment_id)
            .ok_or_else(|| CoreError::CommentNotFound(comment_id.to_string()))?;
        comment.status = status;
        if note.is_some() {
            comment.resolution = note;
        }
        Ok(())
    }

    pub fn pending_comments(&self) -> impl Iterator<Item = &ReviewComment> {
        self.comments
            .iter()
            .filter(|c| c.status == CommentStatus::Pending)
    }
}

impl SessionRecord for ReviewSession {
    fn meta(&self) -> &SessionMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut SessionMeta {
        &mut self.meta
    }
}

impl ConversationRecord for ReviewSession {
    fn create(id: &str) -> Self {
        Self {
            meta: SessionMeta::new(id),
            rounds: Vec::new(),
            comments: Vec::new(),
            thread: None,
        }
    }

    fn rounds(&self) -> Vec<&Round> {
        self.rounds.iter().map(|r| &r.round).collect()
    }

    fn thread(&self) -> Option<&ThreadRef> {
        self.thread.as_ref()
    }

    fn set_thread(&mut self, thread: Option<ThreadRef>) {
        self.thread = thread;
    }

    fn record_round(&mut self, round: Round, git: Option<&GitState>) {
        let number = self.rounds.len() as u32 + 1;
        self.comments
            .extend(parse_review_comments(&round.response, number));
        self.rounds.push(ReviewRound {
            round,
            git: git.cloned(),
        });
    }

    fn recorded_git_state(&self) -> Option<&GitState> {
        self.rounds.iter().rev().find_map(|r| r.git.as_ref())
    }
}
