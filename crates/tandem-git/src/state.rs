//! Git snapshots and the continuation rules built on them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tandem_util::sanitize_id;

/// Commit hash characters used in derived session ids.
pub const COMMIT_PREFIX_LEN: usize = 8;

/// Branch, commit and cleanliness of a working tree at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitState {
    pub branch: String,
    pub commit: String,
    pub clean: bool,
    pub captured_at: DateTime<Utc>,
}

/// Whether a session recorded at one git state may continue at another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Continuation {
    /// Same branch and commit.
    Continue,
    /// Same branch, new commit. Allowed, but the user should know.
    ContinueWithWarning(String),
    /// Different branch. The caller must force continuation explicitly.
    Deny(String),
}

impl Continuation {
    /// True unless the caller has to force continuation.
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Continuation::Deny(_))
    }

    pub fn warning(&self) -> Option<&str> {
        match self {
            Continuation::Continue => None,
            Continuation::ContinueWithWarning(msg) | Continuation::Deny(msg) => Some(msg),
        }
    }
}

impl GitState {
    pub fn new(branch: impl Into<String>, commit: impl Into<String>, clean: bool) -> Self {
        Self {
            branch: branch.into(),
            commit: commit.into(),
            clean,
            captured_at: Utc::now(),
        }
    }

    /// Leading characters of the commit hash.
    pub fn short_commit(&self) -> &str {
        let end = self
            .commit
            .char_indices()
            .nth(COMMIT_PREFIX_LEN)
            .map_or(self.commit.len(), |(i, _)| i);
        &self.commit[..end]
    }

    /// `<sanitized-branch>-<commit prefix>`.
    ///
    /// Switching branch or commit yields a new id, so a new logical session
    /// starts unless the caller names one.
    pub fn default_session_id(&self) -> String {
        format!("{}-{}", sanitize_id(&self.branch), self.short_commit())
    }

    /// Decide whether a session recorded at `recorded` may continue now.
    pub fn continuation_from(&self, recorded: &GitState) -> Continuation {
        if self.branch != recorded.branch {
            return Continuation::Deny(format!(
                "Session was recorded on branch '{}' but the current branch is '{}'",
                recorded.branch, self.branch
            ));
        }
        if self.commit != recorded.commit {
            return Continuation::ContinueWithWarning(format!(
                "New commits since this session was recorded ({} -> {})",
                recorded.short_commit(),
                self.short_commit()
            ));
        }
        Continuation::Continue
    }
}
