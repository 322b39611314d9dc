//! Cache engine configuration derived from the `[site]` and `[cache]` sections.

use crate::config::Settings;

use super::exclusion::ExclusionFilter;

#[derive(Debug, Clone, Default)]
pub struct CacheConfig {
    /// Origin folded into every cache id. Never ends in `/`.
    pub base_url: String,
    /// Raw exclusion strings, compiled by [`CacheConfig::exclusion_filter`].
    pub exclude_patterns: Vec<String>,
    /// Content types enumerated by full generation. Empty means all types.
    pub content_types: Vec<String>,
}

impl CacheConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            base_url: settings.site.base_url.clone(),
            exclude_patterns: settings.cache.exclude_patterns.clone(),
            content_types: settings.cache.content_types.clone(),
        }
    }

    pub fn exclusion_filter(&self) -> ExclusionFilter {
        ExclusionFilter::new(self.exclude_patterns.iter().map(String::as_str))
    }
}
