//! Orchestrates rendering, writing and indexing of static artifacts.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use futures::{StreamExt, TryStreamExt, stream};
use metrics::histogram;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::{CacheConfig, CacheIndex, CacheWrite, GarbageCollector};
use crate::domain::types::TaskAction;
use crate::infra::files::{ArtifactError, ArtifactStore};

use super::locks::PathLocks;
use super::report::{BatchReport, TaskOutcome};
use super::repos::RepoError;
use super::resolver::{
    ContentEnumerator, ContentError, ContentPath, MarkupHook, MarkupKind, PathResolver,
    ResolveError, apply_hooks,
};

const METRIC_RENDER_MS: &str = "static_regen_render_ms";
const DEFAULT_RENDER_CONCURRENCY: usize = 4;

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("invalid path `{path}`: {reason}")]
    InvalidPath { path: String, reason: &'static str },
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Content(#[from] ContentError),
}

impl GenerateError {
    /// Errors that leave the index or content source unusable for the rest
    /// of a batch.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Repo(_) | Self::Content(_))
    }
}

/// Knobs for a single-path generation, shared by ad hoc and queued renders.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// Path handed to the resolver instead of the published path.
    pub generate_path: Option<String>,
    /// Write embedded fragments returned by the render.
    pub emit_fragments: bool,
    /// Leave excluded paths out of the index.
    pub honor_exclusions: bool,
    /// Render even when a valid artifact is already on disk.
    pub force: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            generate_path: None,
            emit_fragments: true,
            honor_exclusions: true,
            force: false,
        }
    }
}

impl GenerateOptions {
    /// Options for systematic renders (queue, full and typed runs).
    pub fn systematic(generate_path: Option<String>) -> Self {
        Self {
            generate_path,
            force: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerateOutcome {
    Written { location: PathBuf, indexed: bool },
    AlreadyCached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationMode {
    /// Delete every page, then render everything.
    Full,
    /// Collect garbage, then render only what the index reports as uncached.
    Incremental,
}

impl GenerationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Incremental => "incremental",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteScope {
    All,
    Pages,
    Fragments,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteSummary {
    pub files_removed: u64,
    pub entries_removed: u64,
}

pub struct StaticGenerator {
    base_url: String,
    content_types: Vec<String>,
    render_concurrency: usize,
    index: Arc<CacheIndex>,
    gc: GarbageCollector,
    store: ArtifactStore,
    resolver: Arc<dyn PathResolver>,
    content: Arc<dyn ContentEnumerator>,
    hooks: Vec<Arc<dyn MarkupHook>>,
    locks: PathLocks,
}

impl StaticGenerator {
    pub fn new(
        config: &CacheConfig,
        index: Arc<CacheIndex>,
        store: ArtifactStore,
        resolver: Arc<dyn PathResolver>,
        content: Arc<dyn ContentEnumerator>,
    ) -> Self {
        Self {
            base_url: config.base_url.clone(),
            content_types: config.content_types.clone(),
            render_concurrency: DEFAULT_RENDER_CONCURRENCY,
            gc: GarbageCollector::new(Arc::clone(&index)),
            index,
            store,
            resolver,
            content,
            hooks: Vec::new(),
            locks: PathLocks::new(),
        }
    }

    pub fn with_render_concurrency(mut self, concurrency: usize) -> Self {
        self.render_concurrency = concurrency.max(1);
        self
    }

    /// Append a markup hook; hooks run in the order they were added.
    pub fn with_hook(mut self, hook: Arc<dyn MarkupHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn index(&self) -> &Arc<CacheIndex> {
        &self.index
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Render one path, write its artifact and record it in the index.
    pub async fn generate_page(
        &self,
        path: &str,
        options: GenerateOptions,
    ) -> Result<GenerateOutcome, GenerateError> {
        let path = validate_path(path)?;
        let render_path = match options.generate_path.as_deref().map(str::trim) {
            Some(alternate) if !alternate.is_empty() => validate_path(alternate)?,
            _ => path,
        };
        let location = self.store.location_for(path)?;

        if !options.force {
            let pending = self
                .index
                .filter_uncached(&self.base_url, &[path.to_string()])
                .await?;
            if pending.is_empty() {
                debug!(
                    target = "static_regen::application::generator",
                    path, "artifact already cached"
                );
                return Ok(GenerateOutcome::AlreadyCached);
            }
        }

        let _guard = self.locks.acquire(&location).await;

        let started = Instant::now();
        let page = self.resolver.render(render_path).await?;
        histogram!(METRIC_RENDER_MS).record(started.elapsed().as_secs_f64() * 1000.0);

        let body = apply_hooks(&self.hooks, MarkupKind::Page, path, page.body);
        self.store.write_atomic(&location, body).await?;

        if options.emit_fragments {
            for fragment in page.fragments {
                let fragment_location = self.store.fragment_location(&fragment.path)?;
                let body = apply_hooks(&self.hooks, MarkupKind::Fragment, &fragment.path, fragment.body);
                self.store.write_atomic(&fragment_location, body).await?;
            }
        }

        let indexed = if options.honor_exclusions && self.index.is_excluded(path) {
            false
        } else {
            self.index
                .set_cache(CacheWrite {
                    base_url: &self.base_url,
                    original_path: path,
                    request_path: render_path,
                    artifact: &location,
                    metadata: &page.metadata,
                    cacheable: page.cacheable,
                })
                .await?
        };

        if !indexed {
            // Rows for this path or its aliases would describe replaced bytes.
            self.index.remove_path(&self.base_url, path).await?;
            self.index.remove_location(&location).await?;
        }

        debug!(
            target = "static_regen::application::generator",
            path,
            render_path,
            location = %location.display(),
            indexed,
            "artifact written"
        );

        Ok(GenerateOutcome::Written { location, indexed })
    }

    /// Remove the artifact for `path` and every index row pointing at it.
    /// Returns `false` when no file existed.
    pub async fn delete_page(&self, path: &str) -> Result<bool, GenerateError> {
        let path = validate_path(path)?;
        let location = self.store.location_for(path)?;
        let _guard = self.locks.acquire(&location).await;

        let removed = self.store.remove(&location).await?;
        self.index.remove_path(&self.base_url, path).await?;
        self.index.remove_location(&location).await?;

        debug!(
            target = "static_regen::application::generator",
            path, removed, "artifact deleted"
        );
        Ok(removed)
    }

    /// Delete several paths. Per-path failures are reported, not raised.
    pub async fn delete_paths(&self, paths: &[String]) -> Result<BatchReport, GenerateError> {
        let started = Instant::now();
        let mut report = BatchReport::default();

        for path in paths {
            match self.delete_page(path).await {
                Ok(_) => report.push(path.clone(), TaskAction::Delete, TaskOutcome::Done),
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    warn!(
                        target = "static_regen::application::generator",
                        path = %path,
                        action = TaskAction::Delete.as_str(),
                        error = %err,
                        "delete failed"
                    );
                    report.push(path.clone(), TaskAction::Delete, TaskOutcome::failed(&err));
                }
            }
        }

        report.elapsed = started.elapsed();
        Ok(report)
    }

    /// Bulk removal of the output tree.
    pub async fn delete_all(&self, scope: DeleteScope) -> Result<DeleteSummary, GenerateError> {
        let mut summary = DeleteSummary::default();

        if matches!(scope, DeleteScope::All | DeleteScope::Pages) {
            summary.files_removed += self.store.purge_pages().await?;
            summary.entries_removed += self.index.clear().await?;
        }
        if matches!(scope, DeleteScope::All | DeleteScope::Fragments) {
            summary.files_removed += self.store.purge_fragments().await?;
        }

        info!(
            target = "static_regen::application::generator",
            files_removed = summary.files_removed,
            entries_removed = summary.entries_removed,
            "output tree purged"
        );
        Ok(summary)
    }

    /// Regenerate the whole site from a fresh enumeration.
    ///
    /// An incremental run against an empty index becomes a full run.
    pub async fn generate_all(&self, mode: GenerationMode) -> Result<BatchReport, GenerateError> {
        let started = Instant::now();

        let mode = match mode {
            GenerationMode::Incremental if self.index.is_empty().await? => {
                info!(
                    target = "static_regen::application::generator",
                    "index is empty; running full generation"
                );
                GenerationMode::Full
            }
            mode => mode,
        };

        let items = self.content.list_all_paths(&self.content_types).await?;
        let total = items.len();

        let targets = match mode {
            GenerationMode::Full => {
                self.delete_all(DeleteScope::Pages).await?;
                dedupe(items)
            }
            GenerationMode::Incremental => {
                self.gc.collect_expired().await?;
                let paths: Vec<String> = items.iter().map(|item| item.path.clone()).collect();
                let mut pending: HashSet<String> = self
                    .index
                    .filter_uncached(&self.base_url, &paths)
                    .await?
                    .into_iter()
                    .collect();
                items
                    .into_iter()
                    .filter(|item| pending.remove(&item.path))
                    .collect()
            }
        };

        let mut report = self.generate_batch(targets).await?;
        report.skipped = total - report.items.len();
        report.elapsed = started.elapsed();

        info!(
            target = "static_regen::application::generator",
            mode = mode.as_str(),
            done = report.done(),
            failed = report.failed(),
            skipped = report.skipped,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "site generation finished"
        );
        Ok(report)
    }

    /// Regenerate one page of a content type's listing.
    pub async fn generate_type(
        &self,
        content_type: &str,
        start: usize,
        length: Option<usize>,
    ) -> Result<BatchReport, GenerateError> {
        let started = Instant::now();
        let items = self
            .content
            .list_paths_by_type(content_type, start, length)
            .await?;

        let mut report = self.generate_batch(dedupe(items)).await?;
        report.elapsed = started.elapsed();

        info!(
            target = "static_regen::application::generator",
            content_type,
            start,
            done = report.done(),
            failed = report.failed(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "typed generation finished"
        );
        Ok(report)
    }

    /// Run garbage collection against the index and the output tree.
    pub async fn collect_garbage(&self) -> Result<Vec<PathBuf>, RepoError> {
        self.gc.collect_expired().await
    }

    async fn generate_batch(&self, items: Vec<ContentPath>) -> Result<BatchReport, GenerateError> {
        let outcomes: Vec<(String, TaskOutcome)> = stream::iter(items)
            .map(|item| async move {
                let options = GenerateOptions::systematic(item.generate_path.clone());
                match self.generate_page(&item.path, options).await {
                    Ok(_) => Ok((item.path, TaskOutcome::Done)),
                    Err(err) if err.is_fatal() => Err(err),
                    Err(err) => {
                        warn!(
                            target = "static_regen::application::generator",
                            path = %item.path,
                            action = TaskAction::Create.as_str(),
                            error = %err,
                            "generation failed"
                        );
                        Ok((item.path, TaskOutcome::failed(&err)))
                    }
                }
            })
            .buffer_unordered(self.render_concurrency)
            .try_collect()
            .await?;

        let mut report = BatchReport::default();
        for (path, outcome) in outcomes {
            report.push(path, TaskAction::Create, outcome);
        }
        Ok(report)
    }
}

fn validate_path(path: &str) -> Result<&str, GenerateError> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err(GenerateError::InvalidPath {
            path: path.to_string(),
            reason: "empty path",
        });
    }
    if !trimmed.starts_with('/') {
        return Err(GenerateError::InvalidPath {
            path: path.to_string(),
            reason: "must start with `/`",
        });
    }
    Ok(trimmed)
}

fn dedupe(items: Vec<ContentPath>) -> Vec<ContentPath> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.path.clone()))
        .collect()
}
