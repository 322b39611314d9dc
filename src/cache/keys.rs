//! Cache id scheme.
//!
//! A cache id is `lowercase(base_url + ":" + normalized_path)`. The
//! normalized path has its trailing slashes removed; the root path stays `/`.

use std::fmt;

const DELIMITER: char = ':';

/// Normalized identifier of one cached address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheId(String);

impl CacheId {
    /// Derive the id of `path` under `base_url`. Pure and stable.
    pub fn compute(base_url: &str, path: &str) -> Self {
        let mut raw = String::with_capacity(base_url.len() + path.len() + 1);
        raw.push_str(base_url);
        raw.push(DELIMITER);
        raw.push_str(normalize_path(path));
        Self(raw.to_lowercase())
    }

    /// Wrap a value read back from storage.
    pub fn from_stored(value: String) -> Self {
        Self(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Shorthand for [`CacheId::compute`].
pub fn compute_cache_id(base_url: &str, path: &str) -> CacheId {
    CacheId::compute(base_url, path)
}

/// Strip trailing slashes; an empty or all-slash path is the root.
pub fn normalize_path(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() { "/" } else { trimmed }
}
