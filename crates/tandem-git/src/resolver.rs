//! Read-only git queries.
//!
//! Branch, commit and dirty state are three independent queries run on the
//! blocking pool at the same time. Any failure fails the whole snapshot.

use crate::{GitError, GitResult, GitState};
use chrono::Utc;
use git2::{ErrorCode, Repository, StatusOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Captures [`GitState`] for one working directory.
#[derive(Debug, Clone)]
pub struct GitStateResolver {
    working_dir: PathBuf,
}

impl GitStateResolver {
    pub fn new(working_dir: impl AsRef<Path>) -> Self {
        Self {
            working_dir: working_dir.as_ref().to_path_buf(),
        }
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Take a fresh snapshot.
    pub async fn resolve(&self) -> GitResult<GitState> {
        let (branch, commit, clean) = tokio::try_join!(
            self.query(current_branch),
            self.query(current_commit),
            self.query(is_clean),
        )?;

        debug!(
            dir = %self.working_dir.display(),
            branch = %branch,
            commit = %commit,
            clean,
            "Resolved git state"
        );
        Ok(GitState {
            branch,
            commit,
            clean,
            captured_at: Utc::now(),
        })
    }

    async fn query<T, F>(&self, f: F) -> GitResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Repository) -> GitResult<T> + Send + 'static,
    {
        let dir = self.working_dir.clone();
        tokio::task::spawn_blocking(move || {
            let repo = open_repo(&dir)?;
            f(&repo)
        })
        .await?
    }
}

fn open_repo(dir: &Path) -> GitResult<Repository> {
    Repository::discover(dir).map_err(|e| match e.code() {
        ErrorCode::NotFound => GitError::NotARepository(dir.to_path_buf()),
        _ => GitError::Git(e),
    })
}

/// Branch shorthand, or `HEAD` when detached.
fn current_branch(repo: &Repository) -> GitResult<String> {
    if repo.head_detached()? {
        return Ok("HEAD".to_string());
    }
    let head = repo.head()?;
    Ok(head.shorthand().unwrap_or("HEAD").to_string())
}

fn current_commit(repo: &Repository) -> GitResult<String> {
    let commit = repo.head()?.peel_to_commit()?;
    Ok(commit.id().to_string())
}

/// No staged, unstaged or untracked changes. Ignored files don't count.
fn is_clean(repo: &Repository) -> GitResult<bool> {
    let mut opts = StatusOptions::new();
    opts.include_untracked(true)
        .recurse_untracked_dirs(false)
        .include_ignored(false)
        .include_unmodified(false);
    let statuses = repo.statuses(Some(&mut opts))?;
    Ok(statuses.is_empty())
}
