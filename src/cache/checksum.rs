//! Tag checksum capability.
//!
//! Every tag carries a monotonically increasing invalidation counter owned by
//! whoever edits content. The checksum of a tag set is the sum of its
//! counters, so bumping any member changes the checksum of every set that
//! contains it. This module only reads counters; [`InMemoryTagChecksums`]
//! exposes `invalidate` for tests and embedded callers.

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::application::repos::RepoError;

use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::checksum";

/// Read-only view of the global invalidation clock.
#[async_trait]
pub trait TagChecksumProvider: Send + Sync {
    /// Current checksum for `tags`, compared against the value stored at write time.
    async fn current_checksum(&self, tags: &BTreeSet<String>) -> Result<String, RepoError>;
}

/// Fold per-tag counters into a checksum. Unknown tags count as zero.
pub fn checksum_from_counts(tags: &BTreeSet<String>, counts: &HashMap<String, i64>) -> String {
    tags.iter()
        .map(|tag| counts.get(tag).copied().unwrap_or(0))
        .sum::<i64>()
        .to_string()
}

/// Process-local invalidation clock.
#[derive(Debug, Default)]
pub struct InMemoryTagChecksums {
    counters: RwLock<HashMap<String, i64>>,
}

impl InMemoryTagChecksums {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bump the counter of every tag in `tags`.
    pub fn invalidate<I, S>(&self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut counters = rw_write(&self.counters, SOURCE, "invalidate");
        for tag in tags {
            *counters.entry(tag.into()).or_insert(0) += 1;
        }
    }
}

#[async_trait]
impl TagChecksumProvider for InMemoryTagChecksums {
    async fn current_checksum(&self, tags: &BTreeSet<String>) -> Result<String, RepoError> {
        let counters = rw_read(&self.counters, SOURCE, "current_checksum");
        Ok(checksum_from_counts(tags, &counters))
    }
}
