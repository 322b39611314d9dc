//! [`PathResolver`] that renders paths by requesting them from the live origin.

use std::collections::BTreeSet;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::{
    Client, StatusCode, Url,
    header::{self, HeaderMap},
};
use time::{OffsetDateTime, format_description::well_known::Rfc2822};
use tracing::warn;

use crate::application::resolver::{PathResolver, RenderedFragment, RenderedPage, ResolveError};
use crate::config::RenderSettings;
use crate::domain::entities::CacheMetadata;

use super::error::InfraError;

const TAG_HEADERS: [&str; 2] = ["cache-tags", "x-drupal-cache-tags"];

static ESI_INCLUDE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"<esi:include\s+[^>]*?src\s*=\s*["']([^"']+)["'][^>]*>"#).ok()
});

pub struct HttpPathResolver {
    client: Client,
    origin: Url,
    fragment_prefix: String,
}

impl HttpPathResolver {
    pub fn new(
        origin: &str,
        fragments_dir: &str,
        settings: &RenderSettings,
    ) -> Result<Self, InfraError> {
        let origin = Url::parse(origin)
            .map_err(|err| InfraError::configuration(format!("invalid origin `{origin}`: {err}")))?;
        let client = Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .build()
            .map_err(|err| InfraError::http(err.to_string()))?;

        Ok(Self {
            client,
            origin,
            fragment_prefix: format!("/{}", fragments_dir.trim_matches('/')),
        })
    }

    fn url_for(&self, path: &str) -> Result<Url, ResolveError> {
        self.origin
            .join(path)
            .map_err(|err| ResolveError::InvalidResponse {
                path: path.to_string(),
                message: format!("cannot build request url: {err}"),
            })
    }

    async fn fetch(&self, path: &str) -> Result<(StatusCode, HeaderMap, bytes::Bytes), ResolveError> {
        let url = self.url_for(path)?;
        let transport = |err: reqwest::Error| ResolveError::Transport {
            path: path.to_string(),
            message: err.to_string(),
        };

        let response = self.client.get(url).send().await.map_err(transport)?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ResolveError::NotFound {
                path: path.to_string(),
            });
        }
        if !status.is_success() {
            return Err(ResolveError::Status {
                path: path.to_string(),
                status: status.as_u16(),
            });
        }

        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(transport)?;
        Ok((status, headers, body))
    }

    async fn fetch_fragments(&self, page_path: &str, markup: &str) -> Vec<RenderedFragment> {
        let mut fragments = Vec::new();
        for source in esi_sources(markup) {
            match self.fetch(&source).await {
                Ok((_, _, body)) => fragments.push(RenderedFragment {
                    path: self.fragment_path(&source),
                    body,
                }),
                Err(err) => warn!(
                    target = "static_regen::infra::http_resolver",
                    path = page_path,
                    fragment = %source,
                    error = %err,
                    "skipping fragment"
                ),
            }
        }
        fragments
    }

    /// Fragment path relative to the fragments directory.
    fn fragment_path(&self, source: &str) -> String {
        let path = source.split(['?', '#']).next().unwrap_or(source);
        match path.strip_prefix(&self.fragment_prefix) {
            Some(rest) if rest.starts_with('/') => rest.to_string(),
            _ => path.to_string(),
        }
    }
}

#[async_trait]
impl PathResolver for HttpPathResolver {
    async fn render(&self, path: &str) -> Result<RenderedPage, ResolveError> {
        let (status, headers, body) = self.fetch(path).await?;
        let now = OffsetDateTime::now_utc().unix_timestamp();

        let fragments = match std::str::from_utf8(&body) {
            Ok(markup) => self.fetch_fragments(path, markup).await,
            Err(_) => Vec::new(),
        };

        Ok(RenderedPage {
            metadata: CacheMetadata {
                expires: declared_expiry(&headers, now),
                tags: cache_tags(&headers),
            },
            cacheable: is_cacheable(status, &headers),
            body,
            fragments,
        })
    }
}

/// Tags advertised by the origin, split on whitespace or commas.
pub fn cache_tags(headers: &HeaderMap) -> BTreeSet<String> {
    TAG_HEADERS
        .iter()
        .flat_map(|name| headers.get_all(*name))
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(|c: char| c.is_whitespace() || c == ','))
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

/// Expiry from `Cache-Control: max-age`, falling back to `Expires`.
pub fn declared_expiry(headers: &HeaderMap, now: i64) -> Option<i64> {
    let max_age = headers
        .get(header::CACHE_CONTROL)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| {
            value
                .split(',')
                .filter_map(|directive| directive.trim().strip_prefix("max-age="))
                .find_map(|seconds| seconds.trim().parse::<i64>().ok())
        });
    if let Some(seconds) = max_age {
        return Some(now.saturating_add(seconds));
    }

    headers
        .get(header::EXPIRES)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| parse_http_date(value.trim()))
        .map(OffsetDateTime::unix_timestamp)
}

fn parse_http_date(value: &str) -> Option<OffsetDateTime> {
    // IMF-fixdate names the zone `GMT`; the numeric form is what RFC 2822 parsers expect.
    let numeric = match value.strip_suffix(" GMT") {
        Some(stamp) => format!("{stamp} +0000"),
        None => value.to_string(),
    };
    OffsetDateTime::parse(&numeric, &Rfc2822).ok()
}

/// Whether a response may be recorded as a reusable artifact.
pub fn is_cacheable(status: StatusCode, headers: &HeaderMap) -> bool {
    if status != StatusCode::OK || headers.contains_key(header::SET_COOKIE) {
        return false;
    }

    !headers
        .get_all(header::CACHE_CONTROL)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|directive| directive.trim().to_ascii_lowercase())
        .any(|directive| matches!(directive.as_str(), "no-store" | "private" | "no-cache"))
}

/// Root-relative `src` values of `<esi:include>` tags, in document order.
pub fn esi_sources(markup: &str) -> Vec<String> {
    let Some(pattern) = ESI_INCLUDE.as_ref() else {
        return Vec::new();
    };
    let mut seen = BTreeSet::new();
    pattern
        .captures_iter(markup)
        .filter_map(|captures| captures.get(1))
        .map(|source| source.as_str().to_string())
        .filter(|source| source.starts_with('/'))
        .filter(|source| seen.insert(source.clone()))
        .collect()
}
