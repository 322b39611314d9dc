//! Seams to the rendering pipeline and the content source.
//!
//! The engine never produces markup itself. It asks a [`PathResolver`] for the
//! body of a path, asks a [`ContentEnumerator`] which paths exist, and hands
//! every body through the configured [`MarkupHook`]s before writing it.

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use thiserror::Error;

use crate::domain::entities::CacheMetadata;

/// Result of rendering one path.
#[derive(Debug, Clone, Default)]
pub struct RenderedPage {
    pub body: Bytes,
    pub metadata: CacheMetadata,
    /// False when the response must not be recorded in the index.
    pub cacheable: bool,
    /// Embedded fragments referenced by the page.
    pub fragments: Vec<RenderedFragment>,
}

#[derive(Debug, Clone)]
pub struct RenderedFragment {
    /// Logical path of the fragment, relative to the fragments root.
    pub path: String,
    pub body: Bytes,
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no content at `{path}`")]
    NotFound { path: String },
    #[error("`{path}` answered with status {status}")]
    Status { path: String, status: u16 },
    #[error("transport failure for `{path}`: {message}")]
    Transport { path: String, message: String },
    #[error("invalid response for `{path}`: {message}")]
    InvalidResponse { path: String, message: String },
}

#[async_trait]
pub trait PathResolver: Send + Sync {
    async fn render(&self, path: &str) -> Result<RenderedPage, ResolveError>;
}

/// One enumerable path of the site.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ContentPath {
    pub path: String,
    /// Alternate path used for the render lookup.
    #[serde(default)]
    pub generate_path: Option<String>,
    #[serde(default)]
    pub content_type: String,
}

impl ContentPath {
    pub fn new(path: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            generate_path: None,
            content_type: content_type.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("content source unavailable: {message}")]
    Source { message: String },
    #[error("content listing malformed: {message}")]
    Parse { message: String },
}

#[async_trait]
pub trait ContentEnumerator: Send + Sync {
    /// Every known path whose type is in `content_types` (all types when empty).
    async fn list_all_paths(
        &self,
        content_types: &[String],
    ) -> Result<Vec<ContentPath>, ContentError>;

    /// Paths of a single type, skipping `start` and taking at most `length`.
    async fn list_paths_by_type(
        &self,
        content_type: &str,
        start: usize,
        length: Option<usize>,
    ) -> Result<Vec<ContentPath>, ContentError>;
}

/// Post-render rewrite applied before an artifact is written.
pub trait MarkupHook: Send + Sync {
    fn modify_page(&self, _path: &str, markup: String) -> String {
        markup
    }

    fn modify_fragment(&self, _path: &str, markup: String) -> String {
        markup
    }
}

/// Which hook entry point to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkupKind {
    Page,
    Fragment,
}

/// Run `hooks` in order. Bodies that are not UTF-8 pass through untouched.
pub fn apply_hooks(
    hooks: &[std::sync::Arc<dyn MarkupHook>],
    kind: MarkupKind,
    path: &str,
    body: Bytes,
) -> Bytes {
    if hooks.is_empty() {
        return body;
    }

    let Ok(markup) = std::str::from_utf8(&body) else {
        return body;
    };

    let mut markup = markup.to_string();
    for hook in hooks {
        markup = match kind {
            MarkupKind::Page => hook.modify_page(path, markup),
            MarkupKind::Fragment => hook.modify_fragment(path, markup),
        };
    }
    Bytes::from(markup)
}

/// Turns absolute links on the public origin into root-relative links, so the
/// tree can be served from any host.
#[derive(Debug, Clone)]
pub struct BaseUrlRewriter {
    base_url: String,
}

impl BaseUrlRewriter {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn rewrite(&self, markup: String) -> String {
        if self.base_url.is_empty() || !markup.contains(&self.base_url) {
            return markup;
        }

        let mut rewritten = markup;
        for quote in ['"', '\''] {
            let bare = format!("{quote}{}{quote}", self.base_url);
            rewritten = rewritten.replace(&bare, &format!("{quote}/{quote}"));
            let prefixed = format!("{quote}{}/", self.base_url);
            rewritten = rewritten.replace(&prefixed, &format!("{quote}/"));
        }
        rewritten
    }
}

impl MarkupHook for BaseUrlRewriter {
    fn modify_page(&self, _path: &str, markup: String) -> String {
        self.rewrite(markup)
    }

    fn modify_fragment(&self, _path: &str, markup: String) -> String {
        self.rewrite(markup)
    }
}
