//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;
#[cfg(test)]
mod tests;

pub use cli::{
    CliArgs, Command, ConfirmArgs, DeleteArgs, EnqueueArgs, GenerateAllArgs, GeneratePageArgs,
    GenerateTypeArgs, GlobalOverrides, InvalidateArgs, ProcessQueueArgs,
};

use std::{
    num::{NonZeroU32, NonZeroUsize},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "static_regen";
const ENV_PREFIX: &str = "STATIC_REGEN";
const DEFAULT_OUTPUT_DIR: &str = "static";
const DEFAULT_MANIFEST: &str = "paths.toml";
const DEFAULT_FRAGMENTS_DIR: &str = "esi";
const DEFAULT_DATABASE_URL: &str = "sqlite://static_regen.db";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 4;
const DEFAULT_JOB_CONCURRENCY: u64 = 2;
const DEFAULT_RENDER_CONCURRENCY: u64 = 4;
const DEFAULT_STALE_CLAIM_SECS: u64 = 600;
const DEFAULT_RENDER_TIMEOUT_SECS: u64 = 30;
const DEFAULT_USER_AGENT: &str = concat!("static-regen/", env!("CARGO_PKG_VERSION"));

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub site: SiteSettings,
    pub cache: CacheSettings,
    pub database: DatabaseSettings,
    pub jobs: JobsSettings,
    pub render: RenderSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone)]
pub struct SiteSettings {
    /// Public origin, without a trailing slash.
    pub base_url: String,
    /// Where pages are fetched from; defaults to `base_url`.
    pub origin_url: String,
    pub output_dir: PathBuf,
    pub manifest: PathBuf,
    pub fragments_dir: String,
}

#[derive(Debug, Clone, Default)]
pub struct CacheSettings {
    pub exclude_patterns: Vec<String>,
    pub content_types: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct JobsSettings {
    pub concurrency: NonZeroUsize,
    pub render_concurrency: NonZeroUsize,
    pub stale_claim: Duration,
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub timeout_seconds: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("cache.content_types")
            .try_parsing(true),
    );

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_global_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    site: RawSiteSettings,
    cache: RawCacheSettings,
    database: RawDatabaseSettings,
    jobs: RawJobsSettings,
    render: RawRenderSettings,
    logging: RawLoggingSettings,
}

impl RawSettings {
    fn apply_global_overrides(&mut self, overrides: &GlobalOverrides) {
        if let Some(url) = overrides.base_url.as_ref() {
            self.site.base_url = Some(url.clone());
        }
        if let Some(dir) = overrides.output_dir.as_ref() {
            self.site.output_dir = Some(dir.clone());
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            site,
            cache,
            database,
            jobs,
            render,
            logging,
        } = raw;

        Ok(Self {
            site: build_site_settings(site)?,
            cache: build_cache_settings(cache),
            database: build_database_settings(database)?,
            jobs: build_jobs_settings(jobs)?,
            render: build_render_settings(render)?,
            logging: build_logging_settings(logging)?,
        })
    }
}

fn build_site_settings(site: RawSiteSettings) -> Result<SiteSettings, LoadError> {
    let base_url = match site.base_url.as_deref().map(str::trim) {
        Some(value) if !value.is_empty() => parse_origin(value, "site.base_url")?,
        _ => return Err(LoadError::invalid("site.base_url", "must be set")),
    };

    let origin_url = match site.origin_url.as_deref().map(str::trim) {
        Some(value) if !value.is_empty() => parse_origin(value, "site.origin_url")?,
        _ => base_url.clone(),
    };

    let output_dir = site
        .output_dir
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));
    if output_dir.as_os_str().is_empty() {
        return Err(LoadError::invalid("site.output_dir", "path must not be empty"));
    }
    // Index rows store artifact locations; they must not depend on the cwd.
    let output_dir = std::path::absolute(&output_dir).map_err(|err| {
        LoadError::invalid("site.output_dir", format!("cannot resolve path: {err}"))
    })?;

    let manifest = site
        .manifest
        .unwrap_or_else(|| PathBuf::from(DEFAULT_MANIFEST));

    let fragments_dir = site
        .fragments_dir
        .map(|value| value.trim_matches('/').to_string())
        .unwrap_or_else(|| DEFAULT_FRAGMENTS_DIR.to_string());
    if fragments_dir.is_empty() || fragments_dir.contains(['/', '\\']) || fragments_dir == ".." {
        return Err(LoadError::invalid(
            "site.fragments_dir",
            "must be a single directory name",
        ));
    }

    Ok(SiteSettings {
        base_url,
        origin_url,
        output_dir,
        manifest,
        fragments_dir,
    })
}

fn parse_origin(value: &str, key: &'static str) -> Result<String, LoadError> {
    let url = Url::parse(value).map_err(|err| LoadError::invalid(key, format!("{err}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(LoadError::invalid(key, "scheme must be http or https"));
    }
    Ok(value.trim_end_matches('/').to_string())
}

fn build_cache_settings(cache: RawCacheSettings) -> CacheSettings {
    let clean = |values: Vec<String>| -> Vec<String> {
        values
            .into_iter()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .collect()
    };

    CacheSettings {
        exclude_patterns: clean(cache.exclude_patterns),
        content_types: clean(cache.content_types),
    }
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database
        .url
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());
    if !url.starts_with("sqlite:") {
        return Err(LoadError::invalid(
            "database.url",
            "only sqlite: URLs are supported",
        ));
    }

    let max_connections = NonZeroU32::new(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS),
    )
    .ok_or_else(|| LoadError::invalid("database.max_connections", "must be greater than zero"))?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_jobs_settings(jobs: RawJobsSettings) -> Result<JobsSettings, LoadError> {
    let concurrency = non_zero_usize(
        jobs.concurrency.unwrap_or(DEFAULT_JOB_CONCURRENCY),
        "jobs.concurrency",
    )?;
    let render_concurrency = non_zero_usize(
        jobs.render_concurrency
            .unwrap_or(DEFAULT_RENDER_CONCURRENCY),
        "jobs.render_concurrency",
    )?;

    let stale_secs = jobs
        .stale_claim_seconds
        .unwrap_or(DEFAULT_STALE_CLAIM_SECS);
    if stale_secs == 0 {
        return Err(LoadError::invalid(
            "jobs.stale_claim_seconds",
            "must be greater than zero",
        ));
    }

    Ok(JobsSettings {
        concurrency,
        render_concurrency,
        stale_claim: Duration::from_secs(stale_secs),
    })
}

fn build_render_settings(render: RawRenderSettings) -> Result<RenderSettings, LoadError> {
    let timeout_seconds = render
        .timeout_seconds
        .unwrap_or(DEFAULT_RENDER_TIMEOUT_SECS);
    if timeout_seconds == 0 {
        return Err(LoadError::invalid(
            "render.timeout_seconds",
            "must be greater than zero",
        ));
    }

    let user_agent = render
        .user_agent
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());

    Ok(RenderSettings {
        timeout_seconds,
        user_agent,
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn non_zero_usize(value: u64, key: &'static str) -> Result<NonZeroUsize, LoadError> {
    let value: usize = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for usize"))?;
    NonZeroUsize::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSiteSettings {
    base_url: Option<String>,
    origin_url: Option<String>,
    output_dir: Option<PathBuf>,
    manifest: Option<PathBuf>,
    fragments_dir: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    exclude_patterns: Vec<String>,
    content_types: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawJobsSettings {
    concurrency: Option<u64>,
    render_concurrency: Option<u64>,
    stale_claim_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRenderSettings {
    timeout_seconds: Option<u64>,
    user_agent: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}
