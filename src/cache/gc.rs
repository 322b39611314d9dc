//! Sweeps artifacts whose index entries are no longer valid.
//!
//! The sweep is two-phase: entries are read and classified first, files are
//! removed next, and rows are deleted last, conditional on the generation
//! seen during classification. A regeneration that lands between the phases
//! bumps the generation, so its fresh row survives the delete.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use metrics::counter;
use tracing::{debug, info, warn};

use crate::application::repos::{EntryRevision, RepoError};
use crate::domain::entities::CacheEntry;

use super::index::{CacheIndex, ValidityCheck, artifact_exists, now_unix};

const METRIC_GC_REMOVED: &str = "static_regen_gc_removed_total";

pub struct GarbageCollector {
    index: Arc<CacheIndex>,
}

impl GarbageCollector {
    pub fn new(index: Arc<CacheIndex>) -> Self {
        Self { index }
    }

    /// Remove artifacts of invalid entries and drop those entries.
    ///
    /// Returns the locations whose files were deleted. A file that is still
    /// referenced by some valid entry is never removed, even if another,
    /// invalid entry points at it too.
    pub async fn collect_expired(&self) -> Result<Vec<PathBuf>, RepoError> {
        let entries = self.index.repo().list_entries().await?;
        let mut check = ValidityCheck::new(self.index.checksums().as_ref(), now_unix());

        let mut live_locations = HashSet::new();
        let mut stale = Vec::new();
        for entry in entries {
            if check.is_valid(&entry).await? {
                live_locations.insert(entry.file_location);
            } else {
                stale.push(entry);
            }
        }

        if stale.is_empty() {
            return Ok(Vec::new());
        }

        let mut removed = Vec::new();
        let mut retained = HashSet::new();
        let mut attempted = HashSet::new();
        for entry in &stale {
            if live_locations.contains(&entry.file_location)
                || !attempted.insert(entry.file_location.clone())
            {
                continue;
            }
            if !artifact_exists(&entry.file_location).await {
                continue;
            }

            match tokio::fs::remove_file(&entry.file_location).await {
                Ok(()) => {
                    debug!(
                        target = "static_regen::cache::gc",
                        location = %entry.file_location.display(),
                        cache_id = %entry.cache_id,
                        "removed stale artifact"
                    );
                    removed.push(entry.file_location.clone());
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    warn!(
                        target = "static_regen::cache::gc",
                        location = %entry.file_location.display(),
                        error = %err,
                        "failed to remove stale artifact; keeping its row for the next sweep"
                    );
                    retained.insert(entry.file_location.clone());
                }
            }
        }

        let revisions = droppable_revisions(&stale, &retained);
        let dropped = self.index.repo().delete_entry_revisions(&revisions).await?;

        counter!(METRIC_GC_REMOVED).increment(removed.len() as u64);
        info!(
            target = "static_regen::cache::gc",
            files_removed = removed.len(),
            rows_dropped = dropped,
            "garbage collection finished"
        );

        Ok(removed)
    }
}

/// Revisions of stale entries whose rows can go. Entries pointing at a file
/// that could not be removed keep their row so the file stays reachable.
fn droppable_revisions(stale: &[CacheEntry], retained: &HashSet<PathBuf>) -> Vec<EntryRevision> {
    stale
        .iter()
        .filter(|entry| !retained.contains(&entry.file_location))
        .map(|entry| EntryRevision {
            cache_id: entry.cache_id.clone(),
            generation: entry.generation,
        })
        .collect()
}
