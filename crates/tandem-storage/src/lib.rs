//! Session persistence for tandem.
//!
//! Each tool owns a directory under the sessions root and stores one JSON
//! file per sanitized session id. Files hold a [`CacheEntry`] envelope with
//! the record, the write time and an absolute expiry time.
//!
//! The store takes no cross-process lock. Writes go through a temp file and
//! a rename so readers never see a torn file, but two concurrent saves of
//! the same id race and the last writer wins.

pub mod entry;
pub mod error;
pub mod store;

pub use entry::{CacheEntry, SessionMeta, SessionRecord};
pub use error::{StorageError, StorageResult};
pub use store::{EvictionPolicy, SessionStore, SessionSummary, StoreConfig};
