//! Repository traits describing persistence adapters.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

use crate::domain::entities::{CacheEntry, QueuedTask, RegenerationTask};
use crate::domain::types::{Expiry, TaskState};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database busy")]
    Busy,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Row written by [`CacheIndexRepo::upsert_entry`].
#[derive(Debug, Clone)]
pub struct NewCacheEntry {
    pub cache_id: String,
    pub file_location: PathBuf,
    pub expiry: Expiry,
    pub tags: BTreeSet<String>,
    pub checksum: String,
    pub created_at: OffsetDateTime,
}

/// Identifies one revision of an index row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryRevision {
    pub cache_id: String,
    pub generation: i64,
}

#[async_trait]
pub trait CacheIndexRepo: Send + Sync {
    async fn fetch_entries(&self, cache_ids: &[String]) -> Result<Vec<CacheEntry>, RepoError>;

    async fn list_entries(&self) -> Result<Vec<CacheEntry>, RepoError>;

    /// Insert or overwrite the row for `entry.cache_id`.
    async fn upsert_entry(&self, entry: NewCacheEntry) -> Result<(), RepoError>;

    /// Insert the row, or refresh an existing one only when it already points
    /// at `entry.file_location`. Returns whether a row was written.
    async fn upsert_alias_entry(&self, entry: NewCacheEntry) -> Result<bool, RepoError>;

    async fn delete_entries(&self, cache_ids: &[String]) -> Result<u64, RepoError>;

    /// Delete rows only if they are still at the given generation.
    async fn delete_entry_revisions(&self, revisions: &[EntryRevision]) -> Result<u64, RepoError>;

    async fn delete_entries_by_location(&self, location: &Path) -> Result<u64, RepoError>;

    async fn count_entries(&self) -> Result<u64, RepoError>;

    async fn clear_entries(&self) -> Result<u64, RepoError>;
}

#[async_trait]
pub trait QueueRepo: Send + Sync {
    /// Append a task in `queued` state, returning its id.
    async fn push_task(&self, task: &RegenerationTask) -> Result<i64, RepoError>;

    /// Atomically move the oldest `queued` row to `processing` for `worker`.
    async fn claim_next(&self, worker: &str) -> Result<Option<QueuedTask>, RepoError>;

    async fn finish_task(
        &self,
        id: i64,
        state: TaskState,
        last_error: Option<&str>,
    ) -> Result<(), RepoError>;

    /// Return `processing` rows claimed before `claimed_before` to `queued`.
    async fn release_stale(&self, claimed_before: OffsetDateTime) -> Result<u64, RepoError>;

    async fn find_task(&self, id: i64) -> Result<Option<QueuedTask>, RepoError>;

    async fn count_by_state(&self) -> Result<HashMap<TaskState, u64>, RepoError>;

    /// Delete rows in a terminal state.
    async fn purge_finished(&self) -> Result<u64, RepoError>;
}

/// Write side of the invalidation clock, used by content-edit hooks.
#[async_trait]
pub trait TagInvalidationRepo: Send + Sync {
    async fn invalidate_tags(&self, tags: &[String]) -> Result<(), RepoError>;
}
