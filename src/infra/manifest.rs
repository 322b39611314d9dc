//! [`ContentEnumerator`] backed by a TOML manifest of site paths.
//!
//! ```toml
//! [[paths]]
//! path = "/"
//! generate_path = "/node/1"
//! content_type = "page"
//!
//! [[paths]]
//! path = "/node/5"
//! content_type = "article"
//! ```
//!
//! The file is re-read on every call so each run sees the current listing.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;

use crate::application::resolver::{ContentEnumerator, ContentError, ContentPath};

#[derive(Debug, Default, Deserialize)]
struct Manifest {
    #[serde(default)]
    paths: Vec<ContentPath>,
}

#[derive(Debug, Clone)]
pub struct ManifestEnumerator {
    location: PathBuf,
}

impl ManifestEnumerator {
    pub fn new(location: impl Into<PathBuf>) -> Self {
        Self {
            location: location.into(),
        }
    }

    async fn load(&self) -> Result<Vec<ContentPath>, ContentError> {
        let raw = tokio::fs::read_to_string(&self.location)
            .await
            .map_err(|err| ContentError::Source {
                message: format!("{}: {err}", self.location.display()),
            })?;
        parse_manifest(&raw).map_err(|message| ContentError::Parse {
            message: format!("{}: {message}", self.location.display()),
        })
    }
}

fn parse_manifest(raw: &str) -> Result<Vec<ContentPath>, String> {
    let manifest: Manifest = toml::from_str(raw).map_err(|err| err.to_string())?;
    Ok(manifest.paths)
}

#[async_trait]
impl ContentEnumerator for ManifestEnumerator {
    async fn list_all_paths(
        &self,
        content_types: &[String],
    ) -> Result<Vec<ContentPath>, ContentError> {
        let paths = self.load().await?;
        if content_types.is_empty() {
            return Ok(paths);
        }
        Ok(paths
            .into_iter()
            .filter(|entry| content_types.iter().any(|ty| *ty == entry.content_type))
            .collect())
    }

    async fn list_paths_by_type(
        &self,
        content_type: &str,
        start: usize,
        length: Option<usize>,
    ) -> Result<Vec<ContentPath>, ContentError> {
        Ok(self
            .load()
            .await?
            .into_iter()
            .filter(|entry| entry.content_type == content_type)
            .skip(start)
            .take(length.unwrap_or(usize::MAX))
            .collect())
    }
}
