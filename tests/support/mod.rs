//! Shared fixtures: an in-process site stub and a generator wired to SQLite.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use sqlx::SqlitePool;
use tempfile::TempDir;

use static_regen::application::generator::StaticGenerator;
use static_regen::application::resolver::{
    ContentEnumerator, ContentError, ContentPath, PathResolver, RenderedFragment, RenderedPage,
    ResolveError,
};
use static_regen::cache::{CacheConfig, CacheIndex};
use static_regen::domain::entities::CacheMetadata;
use static_regen::infra::db::SqliteRepositories;
use static_regen::infra::files::ArtifactStore;

pub const BASE_URL: &str = "https://example.org";

#[derive(Default)]
struct StubPage {
    tags: Vec<String>,
    expires: Option<i64>,
    fragments: Vec<String>,
}

/// Renders `<html>{path}</html>` for every path unless told otherwise.
#[derive(Default)]
pub struct StubSite {
    pages: Mutex<HashMap<String, StubPage>>,
    failing: Mutex<HashSet<String>>,
    uncacheable: Mutex<HashSet<String>>,
    renders: Mutex<Vec<String>>,
}

impl StubSite {
    pub fn tag(&self, path: &str, tags: &[&str]) {
        let mut pages = self.pages.lock().unwrap();
        pages.entry(path.to_string()).or_default().tags =
            tags.iter().map(|tag| tag.to_string()).collect();
    }

    pub fn expire_at(&self, path: &str, timestamp: i64) {
        let mut pages = self.pages.lock().unwrap();
        pages.entry(path.to_string()).or_default().expires = Some(timestamp);
    }

    pub fn embed(&self, path: &str, fragment: &str) {
        let mut pages = self.pages.lock().unwrap();
        pages
            .entry(path.to_string())
            .or_default()
            .fragments
            .push(fragment.to_string());
    }

    pub fn fail(&self, path: &str) {
        self.failing.lock().unwrap().insert(path.to_string());
    }

    pub fn refuse_caching(&self, path: &str) {
        self.uncacheable.lock().unwrap().insert(path.to_string());
    }

    pub fn renders(&self) -> Vec<String> {
        self.renders.lock().unwrap().clone()
    }

    pub fn render_count(&self, path: &str) -> usize {
        self.renders
            .lock()
            .unwrap()
            .iter()
            .filter(|rendered| rendered.as_str() == path)
            .count()
    }
}

#[async_trait]
impl PathResolver for StubSite {
    async fn render(&self, path: &str) -> Result<RenderedPage, ResolveError> {
        self.renders.lock().unwrap().push(path.to_string());
        if self.failing.lock().unwrap().contains(path) {
            return Err(ResolveError::Status {
                path: path.to_string(),
                status: 500,
            });
        }

        let pages = self.pages.lock().unwrap();
        let page = pages.get(path);
        let metadata = CacheMetadata {
            expires: page.and_then(|page| page.expires),
            tags: page
                .map(|page| page.tags.iter().cloned().collect())
                .unwrap_or_default(),
        };
        let fragments = page
            .map(|page| {
                page.fragments
                    .iter()
                    .map(|fragment| RenderedFragment {
                        path: fragment.clone(),
                        body: Bytes::from(format!("<nav>{fragment}</nav>")),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(RenderedPage {
            body: Bytes::from(format!("<html>{path}</html>")),
            metadata,
            cacheable: !self.uncacheable.lock().unwrap().contains(path),
            fragments,
        })
    }
}

/// Fixed content listing.
pub struct StubContent {
    items: Vec<ContentPath>,
}

impl StubContent {
    pub fn new(items: Vec<ContentPath>) -> Self {
        Self { items }
    }
}

#[async_trait]
impl ContentEnumerator for StubContent {
    async fn list_all_paths(
        &self,
        content_types: &[String],
    ) -> Result<Vec<ContentPath>, ContentError> {
        Ok(self
            .items
            .iter()
            .filter(|item| content_types.is_empty() || content_types.contains(&item.content_type))
            .cloned()
            .collect())
    }

    async fn list_paths_by_type(
        &self,
        content_type: &str,
        start: usize,
        length: Option<usize>,
    ) -> Result<Vec<ContentPath>, ContentError> {
        Ok(self
            .items
            .iter()
            .filter(|item| item.content_type == content_type)
            .skip(start)
            .take(length.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }
}

pub struct Harness {
    pub repos: Arc<SqliteRepositories>,
    pub site: Arc<StubSite>,
    pub generator: Arc<StaticGenerator>,
    pub output: TempDir,
}

impl Harness {
    pub fn new(pool: SqlitePool, exclusions: &[&str], items: Vec<ContentPath>) -> Self {
        let repos = Arc::new(SqliteRepositories::new(pool));
        let config = CacheConfig {
            base_url: BASE_URL.to_string(),
            exclude_patterns: exclusions.iter().map(|pattern| pattern.to_string()).collect(),
            content_types: Vec::new(),
        };
        let index = Arc::new(CacheIndex::new(
            repos.clone(),
            repos.clone(),
            config.exclusion_filter(),
        ));
        let output = tempfile::tempdir().expect("temp output dir");
        let store = ArtifactStore::new(output.path(), "esi");
        let site = Arc::new(StubSite::default());
        let generator = StaticGenerator::new(
            &config,
            index,
            store,
            site.clone(),
            Arc::new(StubContent::new(items)),
        )
        .with_render_concurrency(4);

        Self {
            repos,
            site,
            generator: Arc::new(generator),
            output,
        }
    }

    pub fn location(&self, path: &str) -> std::path::PathBuf {
        self.generator
            .store()
            .location_for(path)
            .expect("valid artifact path")
    }
}

pub fn articles(paths: &[&str]) -> Vec<ContentPath> {
    paths
        .iter()
        .map(|path| ContentPath::new(*path, "article"))
        .collect()
}
