//! Persistent index of generated artifacts.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use metrics::counter;
use time::OffsetDateTime;
use tracing::debug;

use crate::application::repos::{CacheIndexRepo, NewCacheEntry, RepoError};
use crate::domain::entities::{CacheEntry, CacheMetadata};
use crate::domain::types::Expiry;

use super::checksum::TagChecksumProvider;
use super::exclusion::ExclusionFilter;
use super::keys::CacheId;

const METRIC_CACHE_HIT: &str = "static_regen_cache_hit_total";
const METRIC_CACHE_MISS: &str = "static_regen_cache_miss_total";
const METRIC_CACHE_EXCLUDED: &str = "static_regen_cache_excluded_total";

/// Everything [`CacheIndex::set_cache`] needs to record one render.
#[derive(Debug, Clone, Copy)]
pub struct CacheWrite<'a> {
    pub base_url: &'a str,
    /// Path the artifact is published under.
    pub original_path: &'a str,
    /// Path that was actually rendered (differs for alias resolution).
    pub request_path: &'a str,
    pub artifact: &'a Path,
    pub metadata: &'a CacheMetadata,
    pub cacheable: bool,
}

/// Maps cache ids to artifact locations, expiry and tags.
///
/// Failures of the backing store are returned to the caller. Nothing here
/// treats an unreachable index as "everything uncached".
pub struct CacheIndex {
    repo: Arc<dyn CacheIndexRepo>,
    checksums: Arc<dyn TagChecksumProvider>,
    exclusions: ExclusionFilter,
}

impl CacheIndex {
    pub fn new(
        repo: Arc<dyn CacheIndexRepo>,
        checksums: Arc<dyn TagChecksumProvider>,
        exclusions: ExclusionFilter,
    ) -> Self {
        Self {
            repo,
            checksums,
            exclusions,
        }
    }

    pub fn compute_cache_id(base_url: &str, path: &str) -> CacheId {
        CacheId::compute(base_url, path)
    }

    pub fn exclusions(&self) -> &ExclusionFilter {
        &self.exclusions
    }

    pub fn is_excluded(&self, path: &str) -> bool {
        self.exclusions().is_excluded(path)
    }

    pub(crate) fn repo(&self) -> &Arc<dyn CacheIndexRepo> {
        &self.repo
    }

    pub(crate) fn checksums(&self) -> &Arc<dyn TagChecksumProvider> {
        &self.checksums
    }

    /// Batch fetch. Ids with no row are absent from the result.
    pub async fn lookup_many(
        &self,
        cache_ids: &[CacheId],
    ) -> Result<HashMap<CacheId, CacheEntry>, RepoError> {
        if cache_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let raw: Vec<String> = cache_ids.iter().map(|id| id.as_str().to_string()).collect();
        let entries = self.repo.fetch_entries(&raw).await?;

        Ok(entries
            .into_iter()
            .map(|entry| (CacheId::from_stored(entry.cache_id.clone()), entry))
            .collect())
    }

    /// Tag checksum matches and expiry has not passed.
    pub async fn is_valid(&self, entry: &CacheEntry) -> Result<bool, RepoError> {
        ValidityCheck::new(self.checksums.as_ref(), now_unix())
            .is_valid(entry)
            .await
    }

    /// Subset of `paths` that must be generated, in input order.
    ///
    /// Excluded paths are always returned. Otherwise a path is dropped only
    /// when a valid entry exists and its artifact is still on disk. Paths that
    /// normalize to the same cache id are reported once.
    pub async fn filter_uncached(
        &self,
        base_url: &str,
        paths: &[String],
    ) -> Result<Vec<String>, RepoError> {
        let mut seen = HashSet::new();
        let mut candidates = Vec::with_capacity(paths.len());
        for path in paths {
            let cache_id = CacheId::compute(base_url, path);
            if seen.insert(cache_id.clone()) {
                candidates.push((cache_id, path));
            }
        }

        let cache_ids: Vec<CacheId> = candidates.iter().map(|(id, _)| id.clone()).collect();
        let entries = self.lookup_many(&cache_ids).await?;
        let exclusions = self.exclusions();
        let mut check = ValidityCheck::new(self.checksums.as_ref(), now_unix());

        let mut uncached = Vec::new();
        for (cache_id, path) in candidates {
            if exclusions.is_excluded(path) {
                counter!(METRIC_CACHE_EXCLUDED).increment(1);
                uncached.push(path.clone());
                continue;
            }

            let hit = match entries.get(&cache_id) {
                Some(entry) => {
                    check.is_valid(entry).await? && artifact_exists(&entry.file_location).await
                }
                None => false,
            };

            if hit {
                counter!(METRIC_CACHE_HIT).increment(1);
            } else {
                counter!(METRIC_CACHE_MISS).increment(1);
                debug!(
                    target = "static_regen::cache::index",
                    path = %path,
                    cache_id = %cache_id,
                    "path needs generation"
                );
                uncached.push(path.clone());
            }
        }

        Ok(uncached)
    }

    /// Record a render. Returns `false` when the render was not cacheable.
    pub async fn set_cache(&self, write: CacheWrite<'_>) -> Result<bool, RepoError> {
        if !write.cacheable {
            return Ok(false);
        }

        let now = OffsetDateTime::now_utc();
        let expiry = effective_expiry(write.metadata.expires, now.unix_timestamp());
        let checksum = self.checksums.current_checksum(&write.metadata.tags).await?;

        let entry = |cache_id: CacheId| NewCacheEntry {
            cache_id: cache_id.into_inner(),
            file_location: write.artifact.to_path_buf(),
            expiry,
            tags: write.metadata.tags.clone(),
            checksum: checksum.clone(),
            created_at: now,
        };

        let primary = CacheId::compute(write.base_url, write.original_path);
        let alias = CacheId::compute(write.base_url, write.request_path);
        let has_alias = alias != primary;
        self.repo.upsert_entry(entry(primary)).await?;

        // An alias never takes over a row that describes another artifact.
        if has_alias && !self.repo.upsert_alias_entry(entry(alias)).await? {
            debug!(
                target = "static_regen::cache::index",
                path = write.original_path,
                alias = write.request_path,
                "alias already owns another artifact; alias row not written"
            );
        }

        Ok(true)
    }

    /// Drop the row for `path`, returning the number of rows removed.
    pub async fn remove_path(&self, base_url: &str, path: &str) -> Result<u64, RepoError> {
        let cache_id = CacheId::compute(base_url, path).into_inner();
        self.repo.delete_entries(&[cache_id]).await
    }

    /// Drop every row that points at `location` (both halves of an alias pair).
    pub async fn remove_location(&self, location: &Path) -> Result<u64, RepoError> {
        self.repo.delete_entries_by_location(location).await
    }

    pub async fn is_empty(&self) -> Result<bool, RepoError> {
        Ok(self.repo.count_entries().await? == 0)
    }

    pub async fn clear(&self) -> Result<u64, RepoError> {
        self.repo.clear_entries().await
    }
}

/// Expiry stored for a render.
///
/// A declared expiry in the future is kept. No declaration, or a declaration
/// that is not after `now`, is stored as [`Expiry::Permanent`].
pub fn effective_expiry(declared: Option<i64>, now: i64) -> Expiry {
    match declared {
        Some(timestamp) if timestamp > now => Expiry::At(timestamp),
        _ => Expiry::Permanent,
    }
}

/// Evaluates validity for many entries, computing each distinct tag set's
/// checksum once.
pub(crate) struct ValidityCheck<'a> {
    checksums: &'a dyn TagChecksumProvider,
    now: i64,
    memo: HashMap<BTreeSet<String>, String>,
}

impl<'a> ValidityCheck<'a> {
    pub(crate) fn new(checksums: &'a dyn TagChecksumProvider, now: i64) -> Self {
        Self {
            checksums,
            now,
            memo: HashMap::new(),
        }
    }

    pub(crate) async fn is_valid(&mut self, entry: &CacheEntry) -> Result<bool, RepoError> {
        if entry.expiry.has_passed(self.now) {
            return Ok(false);
        }

        let current = match self.memo.get(&entry.tags) {
            Some(checksum) => checksum.clone(),
            None => {
                let checksum = self.checksums.current_checksum(&entry.tags).await?;
                self.memo.insert(entry.tags.clone(), checksum.clone());
                checksum
            }
        };

        Ok(current == entry.checksum)
    }
}

pub(crate) fn now_unix() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

pub(crate) async fn artifact_exists(location: &Path) -> bool {
    tokio::fs::metadata(location)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}
