//! Output tree: maps logical paths to artifact files and writes them atomically.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::fs;

const INDEX_FILE: &str = "index.html";
const FRAGMENT_EXTENSION: &str = "html";

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("path `{path}` cannot be mapped into the output tree: {reason}")]
    InvalidPath { path: String, reason: &'static str },
    #[error("io error at `{}`: {source}", location.display())]
    Io {
        location: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ArtifactError {
    fn io(location: &Path, source: io::Error) -> Self {
        Self::Io {
            location: location.to_path_buf(),
            source,
        }
    }

    fn invalid(path: &str, reason: &'static str) -> Self {
        Self::InvalidPath {
            path: path.to_string(),
            reason,
        }
    }
}

/// Filesystem-backed artifact tree.
///
/// Directory-like paths become `<dir>/index.html`; a path whose last segment
/// carries an extension (`/feed.xml`) is written as that file. Fragments live
/// under a dedicated subdirectory that page paths may not enter.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
    fragments_dir: String,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>, fragments_dir: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            fragments_dir: fragments_dir.into().trim_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn fragments_root(&self) -> PathBuf {
        self.root.join(&self.fragments_dir)
    }

    /// Artifact file for a page path.
    pub fn location_for(&self, path: &str) -> Result<PathBuf, ArtifactError> {
        let segments = segments(path)?;
        if segments.first() == Some(&self.fragments_dir.as_str()) {
            return Err(ArtifactError::invalid(path, "reserved for fragments"));
        }

        let mut location = self.root.clone();
        location.extend(&segments);
        if !segments.last().is_some_and(|segment| has_extension(segment)) {
            location.push(INDEX_FILE);
        }
        Ok(location)
    }

    /// Artifact file for an embedded fragment.
    pub fn fragment_location(&self, path: &str) -> Result<PathBuf, ArtifactError> {
        let segments = segments(path)?;
        let Some(last) = segments.last() else {
            return Err(ArtifactError::invalid(path, "empty fragment path"));
        };

        let mut location = self.fragments_root();
        location.extend(&segments);
        if !has_extension(last) {
            location.set_extension(FRAGMENT_EXTENSION);
        }
        Ok(location)
    }

    /// Write `body` to `location` via a sibling temp file and rename, so
    /// readers see either the previous artifact or the complete new one.
    pub async fn write_atomic(&self, location: &Path, body: Bytes) -> Result<(), ArtifactError> {
        let target = location.to_path_buf();
        let Some(parent) = target.parent().map(Path::to_path_buf) else {
            return Err(ArtifactError::invalid(
                &target.display().to_string(),
                "artifact has no parent directory",
            ));
        };

        let outcome = tokio::task::spawn_blocking(move || persist_atomic(&parent, &target, &body))
            .await
            .map_err(|err| ArtifactError::io(location, io::Error::other(err)))?;
        outcome.map_err(|err| ArtifactError::io(location, err))
    }

    /// Delete an artifact. Returns `false` when it was already absent.
    pub async fn remove(&self, location: &Path) -> Result<bool, ArtifactError> {
        match fs::remove_file(location).await {
            Ok(()) => {
                self.prune_empty_parents(location).await;
                Ok(true)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(ArtifactError::io(location, err)),
        }
    }

    /// Remove every page artifact, leaving the fragments directory in place.
    /// Returns the number of files deleted.
    pub async fn purge_pages(&self) -> Result<u64, ArtifactError> {
        let root = self.root.clone();
        let keep = self.fragments_root();
        blocking(&self.root, move || {
            let mut removed = 0;
            let entries = match std::fs::read_dir(&root) {
                Ok(entries) => entries,
                Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(0),
                Err(err) => return Err(err),
            };
            for entry in entries {
                let path = entry?.path();
                if path != keep {
                    removed += remove_tree(&path)?;
                }
            }
            Ok(removed)
        })
        .await
    }

    /// Remove the fragments directory. Returns the number of files deleted.
    pub async fn purge_fragments(&self) -> Result<u64, ArtifactError> {
        let fragments = self.fragments_root();
        let label = fragments.clone();
        blocking(&label, move || remove_tree(&fragments)).await
    }

    async fn prune_empty_parents(&self, location: &Path) {
        let mut current = location.parent();
        while let Some(dir) = current {
            if dir == self.root || !dir.starts_with(&self.root) {
                break;
            }
            if fs::remove_dir(dir).await.is_err() {
                break;
            }
            current = dir.parent();
        }
    }
}

fn segments(path: &str) -> Result<Vec<&str>, ArtifactError> {
    if !path.starts_with('/') {
        return Err(ArtifactError::invalid(path, "must start with `/`"));
    }
    if path.contains(['?', '#', '\\', '\0']) {
        return Err(ArtifactError::invalid(path, "query, fragment or separator characters"));
    }

    let segments: Vec<&str> = path.split('/').filter(|segment| !segment.is_empty()).collect();
    if segments.iter().any(|segment| *segment == "." || *segment == "..") {
        return Err(ArtifactError::invalid(path, "relative segments"));
    }
    Ok(segments)
}

fn has_extension(segment: &str) -> bool {
    segment
        .rsplit_once('.')
        .is_some_and(|(stem, ext)| !stem.is_empty() && !ext.is_empty())
}

fn persist_atomic(parent: &Path, target: &Path, body: &[u8]) -> io::Result<()> {
    std::fs::create_dir_all(parent)?;
    // A concurrent prune may drop the directory between creation and use.
    let mut temp = match NamedTempFile::new_in(parent) {
        Ok(temp) => temp,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            std::fs::create_dir_all(parent)?;
            NamedTempFile::new_in(parent)?
        }
        Err(err) => return Err(err),
    };

    temp.write_all(body)?;
    temp.as_file().sync_all()?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        temp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o644))?;
    }
    temp.persist(target).map_err(|err| err.error)?;
    Ok(())
}

fn remove_tree(path: &Path) -> io::Result<u64> {
    let meta = match std::fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(err),
    };

    if !meta.is_dir() {
        std::fs::remove_file(path)?;
        return Ok(1);
    }

    let mut removed = 0;
    for entry in std::fs::read_dir(path)? {
        removed += remove_tree(&entry?.path())?;
    }
    std::fs::remove_dir(path)?;
    Ok(removed)
}

async fn blocking<F>(location: &Path, job: F) -> Result<u64, ArtifactError>
where
    F: FnOnce() -> io::Result<u64> + Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|err| ArtifactError::io(location, io::Error::other(err)))?
        .map_err(|err| ArtifactError::io(location, err))
}
