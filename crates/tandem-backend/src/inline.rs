//! `@path` file-reference inlining for backends without native file syntax.
//!
//! Every reference is replaced in place with the file's contents, a
//! directory listing, or a bracketed marker. Bad references never fail the
//! prompt; they degrade to text.

use regex::{Captures, Regex};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tandem_util::path::{has_parent_segment, normalize};
use tokio::fs;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

pub const MARKER_TRAVERSAL: &str = "access denied: path traversal";
pub const MARKER_OUTSIDE: &str = "access denied: outside workspace";
pub const MARKER_SYMLINK: &str = "access denied: symlink outside workspace";
pub const MARKER_TOO_LARGE: &str = "file too large";
pub const MARKER_NOT_FOUND: &str = "file not found";
pub const MARKER_READ_ERROR: &str = "error reading file";
pub const MARKER_LIMIT: &str = "inline limit reached";

/// Byte and entry budgets for one prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InlineLimits {
    pub max_file_bytes: u64,
    pub max_total_bytes: u64,
    pub max_dir_entries: usize,
}

impl Default for InlineLimits {
    fn default() -> Self {
        Self {
            max_file_bytes: 10 * 1024 * 1024,
            max_total_bytes: 20 * 1024 * 1024,
            max_dir_entries: 200,
        }
    }
}

static REF_REGEX: OnceLock<Regex> = OnceLock::new();

/// `@token` at the start of the text or after whitespace or an opening
/// bracket/quote, so `user@example.com` is left alone.
fn ref_regex() -> &'static Regex {
    REF_REGEX.get_or_init(|| {
        Regex::new(r#"(^|[\s(\[{"'`])@([^\s@]+)"#)
            .expect("Invalid regex pattern - this is a compile-time constant")
    })
}

/// Trailing punctuation that belongs to the sentence, not the path.
const TRAILING_PUNCT: &[char] = &[',', ';', ':', '!', '?', ')', ']', '}', '"', '\'', '`', '.'];

/// Resolves and inlines `@path` references.
#[derive(Debug, Clone, Default)]
pub struct FileInliner {
    limits: InlineLimits,
}

enum Resolved {
    Marker(&'static str),
    Target { canonical: PathBuf, display: String },
}

/// Per-prompt bookkeeping.
#[derive(Default)]
struct InlineState {
    total_bytes: u64,
    seen_tokens: HashMap<String, PathBuf>,
    seen_targets: HashMap<PathBuf, String>,
}

impl FileInliner {
    pub fn new(limits: InlineLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &InlineLimits {
        &self.limits
    }

    /// Whether the prompt contains anything that looks like a reference.
    pub fn has_references(prompt: &str) -> bool {
        ref_regex().is_match(prompt)
    }

    /// Replace every `@path` reference in `prompt`, resolving against `cwd`.
    pub async fn inline(&self, prompt: &str, cwd: &Path) -> String {
        let regex = ref_regex();
        if !regex.is_match(prompt) {
            return prompt.to_string();
        }

        let workspace = normalize(&absolute(cwd));
        let canonical_workspace = fs::canonicalize(&workspace)
            .await
            .unwrap_or_else(|_| workspace.clone());

        let mut state = InlineState::default();
        let mut out = String::with_capacity(prompt.len());
        let mut last = 0;

        for caps in regex.captures_iter(prompt) {
            let Some(whole) = caps.get(0) else { continue };
            out.push_str(&prompt[last..whole.start()]);
            last = whole.end();

            let (lead, raw) = split_capture(&caps);
            let token = raw.trim_end_matches(TRAILING_PUNCT);
            let trailing = &raw[token.len()..];

            out.push_str(lead);
            if token.is_empty() {
                out.push('@');
                out.push_str(raw);
                continue;
            }

            let replacement = self
                .replace_reference(token, &workspace, &canonical_workspace, &mut state)
                .await;
            out.push_str(&replacement);
            out.push_str(trailing);
        }
        out.push_str(&prompt[last..]);

        debug!(
            references = state.seen_tokens.len(),
            inlined_bytes = state.total_bytes,
            "Inlined file references"
        );
        out
    }

    async fn replace_reference(
        &self,
        token: &str,
        workspace: &Path,
        canonical_workspace: &Path,
        state: &mut InlineState,
    ) -> String {
        if let Some(earlier) = state
            .seen_tokens
            .get(token)
            .and_then(|target| state.seen_targets.get(target))
        {
            return see_earlier(earlier);
        }

        let (canonical, display) = match resolve(token, workspace, canonical_workspace).await {
            Resolved::Marker(marker) => {
                debug!(reference = %token, marker, "File reference rejected");
                return marker_text(marker, token);
            }
            Resolved::Target { canonical, display } => (canonical, display),
        };

        if let Some(earlier) = state.seen_targets.get(&canonical) {
            let pointer = see_earlier(earlier);
            state.seen_tokens.insert(token.to_string(), canonical);
            return pointer;
        }

        let metadata = match fs::metadata(&canonical).await {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(path = %canonical.display(), error = %e, "Failed to stat referenced file");
                return marker_text(MARKER_READ_ERROR, token);
            }
        };

        let rendered = if metadata.is_dir() {
            match self.render_directory(&canonical, &display).await {
                Ok(listing) => listing,
                Err(e) => {
                    warn!(
                        path = %canonical.display(),
                        error = %e,
                        "Failed to list referenced directory"
                    );
                    return marker_text(MARKER_READ_ERROR, token);
                }
            }
        } else {
            let size = metadata.len();
            if size > self.limits.max_file_bytes {
                return marker_text(MARKER_TOO_LARGE, token);
            }
            if state.total_bytes + size > self.limits.max_total_bytes {
                return marker_text(MARKER_LIMIT, token);
            }
            // The file may have grown since the stat; the read is capped too.
            match read_capped(&canonical, self.limits.max_file_bytes).await {
                Ok(None) => return marker_text(MARKER_TOO_LARGE, token),
                Ok(Some(bytes)) => {
                    let read = bytes.len() as u64;
                    if state.total_bytes + read > self.limits.max_total_bytes {
                        return marker_text(MARKER_LIMIT, token);
                    }
                    state.total_bytes += read;
                    render_file(&display, &String::from_utf8_lossy(&bytes))
                }
                Err(e) => {
                    warn!(
                        path = %canonical.display(),
                        error = %e,
                        "Failed to read referenced file"
                    );
                    return marker_text(MARKER_READ_ERROR, token);
                }
            }
        };

        state.seen_tokens.insert(token.to_string(), canonical.clone());
        state.seen_targets.insert(canonical, display);
        rendered
    }

    async fn render_directory(&self, dir: &Path, display: &str) -> std::io::Result<String> {
        let mut names = Vec::new();
        let mut entries = fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let mut name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                name.push('/');
            }
            names.push(name);
        }
        names.sort();

        let total = names.len();
        let mut out = format!("\n--- Directory: {display} ---\n");
        for name in names.iter().take(self.limits.max_dir_entries) {
            out.push_str(name);
            out.push('\n');
        }
        if total > self.limits.max_dir_entries {
            out.push_str(&format!(
                "... ({} more entries not shown)\n",
                total - self.limits.max_dir_entries
            ));
        }
        out.push_str(&format!("--- End of Directory: {display} ---\n"));
        Ok(out)
    }
}

/// Read at most `cap` bytes. `None` when the file holds more than that.
async fn read_capped(path: &Path, cap: u64) -> std::io::Result<Option<Vec<u8>>> {
    let file = fs::File::open(path).await?;
    let mut bytes = Vec::new();
    file.take(cap.saturating_add(1)).read_to_end(&mut bytes).await?;
    if bytes.len() as u64 > cap {
        Ok(None)
    } else {
        Ok(Some(bytes))
    }
}

fn split_capture<'a>(caps: &Captures<'a>) -> (&'a str, &'a str) {
    let lead = caps.get(1).map_or("", |m| m.as_str());
    let raw = caps.get(2).map_or("", |m| m.as_str());
    (lead, raw)
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

async fn resolve(token: &str, workspace: &Path, canonical_workspace: &Path) -> Resolved {
    let requested = Path::new(token);
    let traversal = has_parent_segment(requested);
    let lexical = normalize(&workspace.join(requested));

    if !lexical.starts_with(workspace) {
        return Resolved::Marker(if traversal {
            MARKER_TRAVERSAL
        } else {
            MARKER_OUTSIDE
        });
    }

    if !fs::try_exists(&lexical).await.unwrap_or(false) {
        // A `..` path that does not exist yet is treated as a probe so a
        // file created between check and read cannot slip through.
        return Resolved::Marker(if traversal {
            MARKER_TRAVERSAL
        } else {
            MARKER_NOT_FOUND
        });
    }

    let canonical = match fs::canonicalize(&lexical).await {
        Ok(canonical) => canonical,
        Err(_) => return Resolved::Marker(MARKER_NOT_FOUND),
    };
    if !canonical.starts_with(canonical_workspace) {
        return Resolved::Marker(MARKER_SYMLINK);
    }

    let display = canonical
        .strip_prefix(canonical_workspace)
        .ok()
        .filter(|rel| !rel.as_os_str().is_empty())
        .map(|rel| rel.display().to_string())
        .unwrap_or_else(|| ".".to_string());

    Resolved::Target { canonical, display }
}

fn marker_text(marker: &str, token: &str) -> String {
    format!("[{marker}: {token}]")
}

fn see_earlier(display: &str) -> String {
    format!("[duplicate reference: {display} (see earlier)]")
}

fn render_file(display: &str, content: &str) -> String {
    format!("\n--- File: {display} ---\n{content}\n--- End of File: {display} ---\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn inline(prompt: &str, cwd: &Path) -> String {
        FileInliner::default().inline(prompt, cwd).await
    }

    #[tokio::test]
    async fn inlines_file_contents() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "ALPHA").unwrap();

        let out = inline("explain @a.txt please", dir.path()).await;
        assert!(out.starts_with("explain \n--- File: a.txt ---\nALPHA"));
        assert!(out.ends_with(" please"));
    }

    #[tokio::test]
    async fn prompt_without_references_is_unchanged() {
        let dir = tempdir().unwrap();
        let prompt = "mail me at dev@example.com";
        assert_eq!(inline(prompt, dir.path()).await, prompt);
    }

    #[tokio::test]
    async fn traversal_is_denied() {
        let outer = tempdir().unwrap();
        let workspace = outer.path().join("ws");
        std::fs::create_dir(&workspace).unwrap();
        std::fs::write(outer.path().join("secret.txt"), "TOP_SECRET").unwrap();

        let out = inline("read @../secret.txt", &workspace).await;
        assert!(out.contains(MARKER_TRAVERSAL));
        assert!(!out.contains("TOP_SECRET"));
    }

    #[tokio::test]
    async fn absolute_path_outside_is_denied() {
        let outer = tempdir().unwrap();
        let workspace = tempdir().unwrap();
        let secret = outer.path().join("secret.txt");
        std::fs::write(&secret, "TOP_SECRET").unwrap();

        let out = inline(&format!("read @{}", secret.display()), workspace.path()).await;
        assert!(out.contains(MARKER_OUTSIDE));
        assert!(!out.contains("TOP_SECRET"));
    }

    #[tokio::test]
    async fn missing_traversal_probe_is_denied() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let out = inline("@sub/../nope.txt", dir.path()).await;
        assert!(out.contains(MARKER_TRAVERSAL));
    }

    #[tokio::test]
    async fn missing_file_is_marked() {
        let dir = tempdir().unwrap();
        let out = inline("@nope.txt", dir.path()).await;
        assert_eq!(out, format!("[{MARKER_NOT_FOUND}: nope.txt]"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlink_escape_is_denied() {
        let outer = tempdir().unwrap();
        let workspace = tempdir().unwrap();
        std::fs::write(outer.path().join("secret.txt"), "TOP_SECRET").unwrap();
        std::os::unix::fs::symlink(
            outer.path().join("secret.txt"),
            workspace.path().join("link.txt"),
        )
        .unwrap();

        let out = inline("@link.txt", workspace.path()).await;
        assert!(out.contains(MARKER_SYMLINK));
        assert!(!out.contains("TOP_SECRET"));
    }

    #[tokio::test]
    async fn directory_lists_names_only() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(src.join("nested")).unwrap();
        std::fs::write(src.join("main.rs"), "fn main() { SECRET_BODY }").unwrap();

        let out = inline("@src", dir.path()).await;
        assert!(out.contains("--- Directory: src ---"));
        assert!(out.contains("main.rs\n"));
        assert!(out.contains("nested/\n"));
        assert!(!out.contains("SECRET_BODY"));
    }

    #[tokio::test]
    async fn directory_listing_is_truncated() {
        let dir = tempdir().unwrap();
        for i in 0..5 {
            std::fs::write(dir.path().join(format!("f{i}.txt")), "").unwrap();
        }
        let inliner = FileInliner::new(InlineLimits {
            max_dir_entries: 2,
            ..InlineLimits::default()
        });
        let out = inliner.inline("@./", dir.path()).await;
        assert!(out.contains("f0.txt"));
        assert!(!out.contains("f4.txt"));
        assert!(out.contains("(3 more entries not shown)"));
    }

    #[tokio::test]
    async fn oversized_file_is_not_read() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("big.txt"), "0123456789").unwrap();
        let inliner = FileInliner::new(InlineLimits {
            max_file_bytes: 5,
            ..InlineLimits::default()
        });
        let out = inliner.inline("@big.txt", dir.path()).await;
        assert_eq!(out, format!("[{MARKER_TOO_LARGE}: big.txt]"));
    }

    #[tokio::test]
    async fn capped_read_stops_past_the_limit() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("grows.txt");
        std::fs::write(&path, "0123456789").unwrap();

        assert_eq!(read_capped(&path, 5).await.unwrap(), None);
        assert_eq!(
            read_capped(&path, 10).await.unwrap().as_deref(),
            Some(&b"0123456789"[..])
        );
    }

    #[tokio::test]
    async fn total_budget_rejects_remaining_refs() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("one.txt"), "111111").unwrap();
        std::fs::write(dir.path().join("two.txt"), "222222").unwrap();
        let inliner = FileInliner::new(InlineLimits {
            max_total_bytes: 10,
            ..InlineLimits::default()
        });
        let out = inliner.inline("@one.txt @two.txt", dir.path()).await;
        assert!(out.contains("111111"));
        assert!(!out.contains("222222"));
        assert!(out.contains(&format!("[{MARKER_LIMIT}: two.txt]")));
    }

    #[tokio::test]
    async fn same_target_via_two_tokens_is_inlined_once() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "ALPHA").unwrap();

        let out = inline("@a.txt and @./a.txt", dir.path()).await;
        assert_eq!(out.matches("--- File: a.txt ---").count(), 1);
        assert_eq!(out.matches("ALPHA").count(), 1);
        assert_eq!(out.matches("see earlier").count(), 1);
    }

    #[tokio::test]
    async fn repeated_token_is_inlined_once() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "ALPHA").unwrap();

        let out = inline("@a.txt @a.txt @a.txt", dir.path()).await;
        assert_eq!(out.matches("ALPHA").count(), 1);
        assert_eq!(out.matches("see earlier").count(), 2);
    }

    #[tokio::test]
    async fn trailing_punctuation_is_preserved() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "ALPHA").unwrap();

        let out = inline("(see @a.txt).", dir.path()).await;
        assert!(out.starts_with("(see \n--- File: a.txt ---"));
        assert!(out.ends_with("---\n)."));
    }
}
