//! Generic per-tool session store.
//!
//! Layout: `<root>/<tool>/<sanitized-id>.json`. An optional legacy root with
//! the same layout is consulted on a miss; records found there are moved
//! into the primary root.

use crate::entry::{CacheEntry, EntryHeader, SessionRecord};
use crate::{StorageError, StorageResult};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tandem_util::sanitize_id;
use tokio::fs;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use ulid::Ulid;

/// Which timestamp decides what gets evicted first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Least recently accessed first.
    #[default]
    Lru,
    /// Oldest created first.
    Fifo,
}

/// Per-tool store settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub ttl: Duration,
    pub max_sessions: usize,
    pub policy: EvictionPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(24 * 60 * 60),
            max_sessions: 100,
            policy: EvictionPolicy::Lru,
        }
    }
}

/// Listing entry returned by [`SessionStore::list`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Persistent store for one tool's session records.
pub struct SessionStore<T> {
    tool: String,
    dir: PathBuf,
    legacy_dir: Option<PathBuf>,
    config: StoreConfig,
    dir_ready: OnceCell<()>,
    _record: PhantomData<fn() -> T>,
}

impl<T: SessionRecord> SessionStore<T> {
    /// Create a store for `tool` under `root`. Nothing touches the disk
    /// until the first save.
    pub fn new(root: impl AsRef<Path>, tool: &str, config: StoreConfig) -> Self {
        let tool = sanitize_id(tool);
        Self {
            dir: root.as_ref().join(&tool),
            tool,
            legacy_dir: None,
            config,
            dir_ready: OnceCell::new(),
            _record: PhantomData,
        }
    }

    /// Also look for records under `legacy_root/<tool>` and migrate them.
    pub fn with_legacy_root(mut self, legacy_root: impl AsRef<Path>) -> Self {
        self.legacy_dir = Some(legacy_root.as_ref().join(&self.tool));
        self
    }

    pub fn tool(&self) -> &str {
        &self.tool
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn path_for(dir: &Path, id: &str) -> PathBuf {
        dir.join(format!("{}.json", sanitize_id(id)))
    }

    fn ttl_ms(&self) -> i64 {
        i64::try_from(self.config.ttl.as_millis()).unwrap_or(i64::MAX)
    }

    async fn ensure_dir(&self) -> StorageResult<()> {
        self.dir_ready
            .get_or_try_init(|| async {
                fs::create_dir_all(&self.dir)
                    .await
                    .map_err(|e| StorageError::directory_init(&self.dir, e))?;
                debug!(tool = %self.tool, dir = %self.dir.display(), "Session directory ready");
                Ok::<(), StorageError>(())
            })
            .await?;
        Ok(())
    }

    /// Persist `record` under `id`, sweeping and evicting as needed.
    pub async fn save(&self, id: &str, record: &mut T) -> StorageResult<()> {
        self.ensure_dir().await?;

        let threshold = (self.config.max_sessions * 4).div_ceil(5);
        if self.count().await? >= threshold {
            self.sweep_expired().await?;
        }

        record.meta_mut().touch();
        let path = Self::path_for(&self.dir, id);
        self.write_entry(&path, record, None).await?;
        debug!(tool = %self.tool, path = %path.display(), "Saved session");

        if self.count().await? > self.config.max_sessions {
            self.evict().await?;
        }
        Ok(())
    }

    /// Load the record stored under `id`.
    ///
    /// Expired and undecodable files are deleted and reported as `None`.
    pub async fn load(&self, id: &str) -> StorageResult<Option<T>> {
        let primary = Self::path_for(&self.dir, id);
        let (path, from_legacy) = if fs::try_exists(&primary).await.unwrap_or(false) {
            (primary.clone(), false)
        } else {
            match &self.legacy_dir {
                Some(legacy) => {
                    let legacy_path = Self::path_for(legacy, id);
                    if fs::try_exists(&legacy_path).await.unwrap_or(false) {
                        (legacy_path, true)
                    } else {
                        return Ok(None);
                    }
                }
                None => return Ok(None),
            }
        };

        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::Io(e)),
        };

        let entry: CacheEntry<T> = match serde_json::from_str(&content) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Corrupt session file, removing");
                remove_if_exists(&path).await?;
                return Ok(None);
            }
        };

        if entry.is_expired(now_ms()) {
            debug!(path = %path.display(), "Session expired, removing");
            remove_if_exists(&path).await?;
            return Ok(None);
        }

        let expiry_time = entry.expiry_time;
        let mut record = entry.data;
        record.meta_mut().touch();

        if from_legacy {
            self.ensure_dir().await?;
            self.write_entry(&primary, &record, Some(expiry_time)).await?;
            remove_if_exists(&path).await?;
            info!(
                tool = %self.tool,
                from = %path.display(),
                to = %primary.display(),
                "Migrated legacy session"
            );
        } else if self.config.policy == EvictionPolicy::Lru {
            self.write_entry(&primary, &record, Some(expiry_time)).await?;
        }

        Ok(Some(record))
    }

    /// Remove the record stored under `id`. Missing records are not an error.
    pub async fn delete(&self, id: &str) -> StorageResult<()> {
        remove_if_exists(&Self::path_for(&self.dir, id)).await
    }

    /// Remove every record of this tool.
    pub async fn clear(&self) -> StorageResult<usize> {
        let files = self.session_files().await?;
        for path in &files {
            remove_if_exists(path).await?;
        }
        Ok(files.len())
    }

    /// Summaries of every live record. Expired or unreadable files are skipped.
    pub async fn list(&self) -> StorageResult<Vec<SessionSummary>> {
        let now = now_ms();
        let mut summaries = Vec::new();

        for path in self.session_files().await? {
            let Some(header) = read_header(&path).await else {
                continue;
            };
            if now > header.expiry_time {
                continue;
            }
            summaries.push(SessionSummary {
                id: header.data.id,
                created_at: header.data.created_at,
                last_accessed_at: header.data.last_accessed_at,
                expires_at: Utc
                    .timestamp_millis_opt(header.expiry_time)
                    .single()
                    .unwrap_or_else(Utc::now),
            });
        }

        summaries.sort_by(|a, b| b.last_accessed_at.cmp(&a.last_accessed_at));
        Ok(summaries)
    }

    /// Delete expired and unreadable records. Returns how many were removed.
    pub async fn sweep_expired(&self) -> StorageResult<usize> {
        let now = now_ms();
        let mut removed = 0;

        for path in self.session_files().await? {
            let stale = match read_header(&path).await {
                Some(header) => now > header.expiry_time,
                None => true,
            };
            if stale {
                remove_if_exists(&path).await?;
                removed += 1;
            }
        }

        if removed > 0 {
            debug!(tool = %self.tool, removed, "Swept expired sessions");
        }
        Ok(removed)
    }

    async fn evict(&self) -> StorageResult<()> {
        let mut candidates = Vec::new();
        for path in self.session_files().await? {
            match read_header(&path).await {
                Some(header) => {
                    let key = match self.config.policy {
                        EvictionPolicy::Lru => header.data.last_accessed_at,
                        EvictionPolicy::Fifo => header.data.created_at,
                    };
                    candidates.push((key, path));
                }
                None => remove_if_exists(&path).await?,
            }
        }

        // Stable sort: equal timestamps keep directory enumeration order.
        candidates.sort_by(|a, b| a.0.cmp(&b.0));

        let excess = candidates.len().saturating_sub(self.config.max_sessions);
        for (_, path) in candidates.into_iter().take(excess) {
            info!(
                tool = %self.tool,
                path = %path.display(),
                policy = ?self.config.policy,
                "Evicting session"
            );
            remove_if_exists(&path).await?;
        }
        Ok(())
    }

    async fn count(&self) -> StorageResult<usize> {
        Ok(self.session_files().await?.len())
    }

    async fn session_files(&self) -> StorageResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        match fs::read_dir(&self.dir).await {
            Ok(mut entries) => {
                while let Some(entry) = entries.next_entry().await? {
                    let path = entry.path();
                    if path.extension().is_some_and(|ext| ext == "json") {
                        files.push(path);
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(StorageError::Io(e)),
        }
        Ok(files)
    }

    /// Write atomically (temp file, then rename). `expiry_time` keeps an
    /// existing expiry; `None` starts a fresh TTL.
    async fn write_entry(
        &self,
        path: &Path,
        record: &T,
        expiry_time: Option<i64>,
    ) -> StorageResult<()> {
        let now = now_ms();
        let mut entry = CacheEntry::new(record, now, self.ttl_ms());
        if let Some(expiry_time) = expiry_time {
            entry.expiry_time = expiry_time;
        }

        let content = serde_json::to_string_pretty(&entry)?;
        // Unique per write: concurrent LRU touches of one id must not share it.
        let temp_path = path.with_extension(format!("json.{}.tmp", Ulid::new()));
        fs::write(&temp_path, &content).await?;
        if let Err(e) = fs::rename(&temp_path, path).await {
            remove_if_exists(&temp_path).await?;
            return Err(StorageError::Io(e));
        }
        Ok(())
    }
}

impl<T> std::fmt::Debug for SessionStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("tool", &self.tool)
            .field("dir", &self.dir)
            .field("legacy_dir", &self.legacy_dir)
            .field("config", &self.config)
            .finish()
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

async fn read_header(path: &Path) -> Option<EntryHeader> {
    let content = fs::read_to_string(path).await.ok()?;
    match serde_json::from_str(&content) {
        Ok(header) => Some(header),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Unreadable session header");
            None
        }
    }
}

async fn remove_if_exists(path: &Path) -> StorageResult<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StorageError::Io(e)),
    }
}
