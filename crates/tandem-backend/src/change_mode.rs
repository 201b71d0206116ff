//! Change mode: ask the model for exact edit blocks and parse them back.
//!
//! Expected response shape, repeated once per edit:
//!
//! ~~~text
//! FILE: src/lib.rs:42
//! OLD:
//! ```
//! <exact existing lines>
//! ```
//! NEW:
//! ```
//! <replacement lines>
//! ```
//! ~~~

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use thiserror::Error;

/// One machine-applicable edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEdit {
    pub file: String,
    pub line: u32,
    pub old: String,
    pub new: String,
}

impl ChangeEdit {
    /// Render back into the block format.
    pub fn render(&self) -> String {
        format!(
            "FILE: {}:{}\nOLD:\n```\n{}\n```\nNEW:\n```\n{}\n```\n",
            self.file, self.line, self.old, self.new
        )
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChangeModeError {
    /// No well-formed block was found. The raw response is kept so the
    /// caller can show it to the user verbatim.
    #[error("No edit blocks found in response")]
    NoEdits { raw: String },
}

const INSTRUCTIONS: &str = r#"[CHANGE MODE]
Respond ONLY with edit blocks. Do not include explanations outside the blocks.
For every change emit exactly:

FILE: <relative/path>:<first line number of OLD>
OLD:
```
<the exact existing lines, copied character for character>
```
NEW:
```
<the replacement lines>
```

Rules:
- OLD must match the current file exactly, including indentation.
- Use one block per contiguous change; repeat FILE for each block.
- To insert, include the line before the insertion point in both OLD and NEW.
- To delete, leave NEW empty.
"#;

/// Prefix the user's request with the change-mode format instructions.
pub fn wrap_prompt(prompt: &str) -> String {
    format!("{INSTRUCTIONS}\n[REQUEST]\n{prompt}")
}

static FILE_LINE: OnceLock<Regex> = OnceLock::new();

fn file_line_regex() -> &'static Regex {
    FILE_LINE.get_or_init(|| {
        Regex::new(r"^\**\s*FILE:\s*(.+?):(\d+)\s*\**\s*$")
            .expect("Invalid regex pattern - this is a compile-time constant")
    })
}

fn is_label(line: &str, label: &str) -> bool {
    line.trim().trim_matches('*').trim() == label
}

fn is_fence(line: &str) -> bool {
    line.trim_start().starts_with("```")
}

/// Parse every well-formed edit block out of a response.
pub fn parse_edits(response: &str) -> Result<Vec<ChangeEdit>, ChangeModeError> {
    let lines: Vec<&str> = response.lines().collect();
    let mut edits = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let Some(caps) = file_line_regex().captures(lines[i].trim()) else {
            i += 1;
            continue;
        };
        let file = caps[1].trim().to_string();
        let line: u32 = caps[2].parse().unwrap_or(0);
        i += 1;

        let Some(after_old) = expect_label(&lines, i, "OLD:") else {
            continue;
        };
        let (old, next) = read_block(&lines, after_old, |l| is_label(l, "NEW:"));
        let Some(after_new) = expect_label(&lines, next, "NEW:") else {
            i = next;
            continue;
        };
        let (new, next) = read_block(&lines, after_new, |l| {
            file_line_regex().is_match(l.trim())
        });

        edits.push(ChangeEdit {
            file,
            line,
            old,
            new,
        });
        i = next;
    }

    if edits.is_empty() {
        Err(ChangeModeError::NoEdits {
            raw: response.to_string(),
        })
    } else {
        Ok(edits)
    }
}

/// Skip blank lines and return the index after `label`, if it is next.
fn expect_label(lines: &[&str], mut i: usize, label: &str) -> Option<usize> {
    while i < lines.len() && lines[i].trim().is_empty() {
        i += 1;
    }
    (i < lines.len() && is_label(lines[i], label)).then_some(i + 1)
}

/// Read a fenced block, or unfenced lines up to `stop`. Returns the text
/// and the index of the first unconsumed line.
fn read_block(lines: &[&str], mut i: usize, stop: impl Fn(&str) -> bool) -> (String, usize) {
    while i < lines.len() && lines[i].trim().is_empty() {
        i += 1;
    }

    let mut body = Vec::new();
    if i < lines.len() && is_fence(lines[i]) {
        i += 1;
        while i < lines.len() && !is_fence(lines[i]) {
            body.push(lines[i]);
            i += 1;
        }
        // Skip the closing fence.
        i = (i + 1).min(lines.len());
    } else {
        while i < lines.len() && !stop(lines[i]) {
            body.push(lines[i]);
            i += 1;
        }
        while body.last().is_some_and(|l| l.trim().is_empty()) {
            body.pop();
        }
    }
    (body.join("\n"), i)
}

/// Split edits into groups whose rendered size stays under `max_chars`.
///
/// A single edit larger than the budget gets a group of its own.
pub fn chunk_edits(edits: &[ChangeEdit], max_chars: usize) -> Vec<Vec<ChangeEdit>> {
    let mut chunks: Vec<Vec<ChangeEdit>> = Vec::new();
    let mut current: Vec<ChangeEdit> = Vec::new();
    let mut size = 0;

    for edit in edits {
        let len = edit.render().len();
        if !current.is_empty() && size + len > max_chars {
            chunks.push(std::mem::take(&mut current));
            size = 0;
        }
        size += len;
        current.push(edit.clone());
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
