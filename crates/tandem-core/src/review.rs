//! Review comments and the parser that extracts them from review output.
//!
//! Reviewers are asked to emit one header line per finding:
//!
//! ```text
//! [CRITICAL] src/auth.rs:40-52 — token is compared with ==
//! [SUGGESTION] README.md — mention the new flag
//! ```
//!
//! Lines after a header, up to the next header, continue its body.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Important,
    Suggestion,
    Question,
}

impl Severity {
    /// Parse a severity tag. Unknown tags are treated as suggestions.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "critical" | "blocker" => Severity::Critical,
            "important" | "major" => Severity::Important,
            "question" => Severity::Question,
            _ => Severity::Suggestion,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Important => "important",
            Severity::Suggestion => "suggestion",
            Severity::Question => "question",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a comment stands after later rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentStatus {
    #[default]
    Pending,
    Accepted,
    Rejected,
    Modified,
    Deferred,
}

/// Inclusive line span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRange {
    pub start: u32,
    pub end: u32,
}

impl fmt::Display for LineRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// One finding from a review round.
///
/// Comments are never removed from a session, only re-marked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewComment {
    pub id: String,
    /// File path or glob the comment applies to.
    pub file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lines: Option<LineRange>,
    pub severity: Severity,
    pub body: String,
    /// Round the comment was raised in (1-based).
    pub round: u32,
    #[serde(default)]
    pub status: CommentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
}

impl ReviewComment {
    /// `file:lines`, or just the file when no lines were given.
    pub fn location(&self) -> String {
        match self.lines {
            Some(lines) => format!("{}:{}", self.file, lines),
            None => self.file.clone(),
        }
    }
}

static HEADER: OnceLock<Regex> = OnceLock::new();

fn header_regex() -> &'static Regex {
    HEADER.get_or_init(|| {
        Regex::new(
            concat!(
                r"^\s*(?:[-*]\s+)?\*{0,2}\[([A-Za-z]+)\]\*{0,2}\s+",
                r"`?([^\s`]+?)`?(?::(\d+)(?:-(\d+))?)?",
                r"\s*(?:—|–|-|:)\s+(.*)$",
            ),
        )
        .expect("Invalid regex pattern - this is a compile-time constant")
    })
}

/// Extract comments from one round of review output.
///
/// Ids are `c-<round>-<n>` with `n` counting from 1 within the round.
/// Output without any header yields no comments.
pub fn parse_review_comments(output: &str, round: u32) -> Vec<ReviewComment> {
    let mut comments: Vec<ReviewComment> = Vec::new();

    for line in output.lines() {
        if let Some(caps) = header_regex().captures(line) {
            let start = caps.get(3).and_then(|m| m.as_str().parse::<u32>().ok());
            let end = caps.get(4).and_then(|m| m.as_str().parse::<u32>().ok());
            let lines = start.map(|start| LineRange {
                start,
                end: end.unwrap_or(start).max(start),
            });

            comments.push(ReviewComment {
                id: format!("c-{}-{}", round, comments.len() + 1),
                file: caps[2].to_string(),
                lines,
                severity: Severity::from_tag(&caps[1]),
                body: caps[5].trim().to_string(),
                round,
                status: CommentStatus::Pending,
                resolution: None,
            });
        } else if let Some(last) = comments.last_mut() {
            let text = line.trim();
            if !text.is_empty() {
                if !last.body.is_empty() {
                    last.body.push('\n');
                }
                last.body.push_str(text);
            }
        }
    }

    comments
}
