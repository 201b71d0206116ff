//! On-disk envelope and the metadata every session record carries.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Metadata shared by every tool's session record.
///
/// `created_at` is set once when the record is created. `last_accessed_at`
/// is refreshed by the store on every load and save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMeta {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
}

impl SessionMeta {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            created_at: now,
            last_accessed_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.last_accessed_at = Utc::now();
    }
}

/// A record the [`SessionStore`](crate::SessionStore) can persist.
///
/// Implementors embed a [`SessionMeta`] with `#[serde(flatten)]` so the
/// store can read timestamps without knowing the concrete record type.
pub trait SessionRecord: Serialize + DeserializeOwned + Send + Sync {
    fn meta(&self) -> &SessionMeta;
    fn meta_mut(&mut self) -> &mut SessionMeta;
}

/// The envelope written to disk.
///
/// Timestamps are unix milliseconds. An entry is expired as soon as
/// `now > expiry_time`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<T> {
    pub data: T,
    pub timestamp: i64,
    pub expiry_time: i64,
}

impl<T> CacheEntry<T> {
    pub fn new(data: T, now_ms: i64, ttl_ms: i64) -> Self {
        Self {
            data,
            timestamp: now_ms,
            expiry_time: now_ms.saturating_add(ttl_ms),
        }
    }

    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms > self.expiry_time
    }
}

/// Timestamps only; used for eviction and listing without decoding the
/// full record.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct EntryHeader {
    pub data: SessionMeta,
    #[serde(rename = "expiryTime")]
    pub expiry_time: i64,
}
