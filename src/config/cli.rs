use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the static-regen binary.
#[derive(Debug, Parser)]
#[command(
    name = "static-regen",
    version,
    about = "Render a dynamic site into static files and keep them fresh"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "STATIC_REGEN_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: GlobalOverrides,

    #[command(subcommand)]
    pub command: Command,
}

/// Overrides accepted by every command; they win over files and environment.
#[derive(Debug, Args, Default, Clone)]
pub struct GlobalOverrides {
    /// Override the origin used in cache ids.
    #[arg(long = "base-url", value_name = "URL", global = true)]
    pub base_url: Option<String>,

    /// Override the directory the static tree is written to.
    #[arg(long = "output-dir", value_name = "PATH", value_hint = ValueHint::DirPath, global = true)]
    pub output_dir: Option<PathBuf>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL", global = true)]
    pub database_url: Option<String>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Delete generated pages, fragments, or both.
    Delete(DeleteArgs),
    /// Generate every enumerable path.
    #[command(name = "generate-all")]
    GenerateAll(GenerateAllArgs),
    /// Generate one slice of a content type's paths.
    #[command(name = "generate-type")]
    GenerateType(GenerateTypeArgs),
    /// Generate a single path.
    #[command(name = "generate-page")]
    GeneratePage(GeneratePageArgs),
    /// Add a task to the regeneration queue.
    Enqueue(EnqueueArgs),
    /// Drain the regeneration queue.
    #[command(name = "process-queue")]
    ProcessQueue(ProcessQueueArgs),
    /// Remove artifacts whose index entries are no longer valid.
    Gc,
    /// Bump invalidation counters for tags.
    Invalidate(InvalidateArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ConfirmArgs {
    /// Skip the interactive confirmation.
    #[arg(short = 'y', long = "yes", action = clap::ArgAction::SetTrue)]
    pub yes: bool,
}

#[derive(Debug, Args, Clone)]
pub struct DeleteArgs {
    /// Delete pages only, keeping fragments.
    #[arg(long, action = clap::ArgAction::SetTrue, conflicts_with = "esi")]
    pub pages: bool,

    /// Delete embedded fragments only.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub esi: bool,

    #[command(flatten)]
    pub confirm: ConfirmArgs,
}

#[derive(Debug, Args, Clone)]
pub struct GenerateAllArgs {
    /// Delete every page first and regenerate from scratch.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub full: bool,

    #[command(flatten)]
    pub confirm: ConfirmArgs,
}

#[derive(Debug, Args, Clone)]
pub struct GenerateTypeArgs {
    /// Content type to enumerate.
    #[arg(value_name = "TYPE")]
    pub content_type: String,

    /// Number of paths to skip.
    #[arg(long, default_value_t = 0)]
    pub start: usize,

    /// Maximum number of paths to generate.
    #[arg(long)]
    pub length: Option<usize>,
}

#[derive(Debug, Args, Clone)]
pub struct GeneratePageArgs {
    /// Published path of the page.
    #[arg(value_name = "PATH")]
    pub path: String,

    /// Alternate path used for the render lookup.
    #[arg(long = "generate-path", value_name = "PATH")]
    pub generate_path: Option<String>,

    /// Do not write embedded fragments.
    #[arg(long = "no-fragments", action = clap::ArgAction::SetTrue)]
    pub no_fragments: bool,

    /// Index the page even when it matches an exclusion rule.
    #[arg(long = "ignore-exclusions", action = clap::ArgAction::SetTrue)]
    pub ignore_exclusions: bool,

    /// Render even if a valid artifact exists.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub force: bool,
}

#[derive(Debug, Args, Clone)]
pub struct EnqueueArgs {
    #[arg(value_name = "PATH")]
    pub path: String,

    /// Alternate path used for the render lookup.
    #[arg(long = "generate-path", value_name = "PATH", conflicts_with = "delete")]
    pub generate_path: Option<String>,

    /// Queue a deletion instead of a render.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub delete: bool,
}

#[derive(Debug, Args, Clone)]
pub struct ProcessQueueArgs {
    /// Override `jobs.concurrency` for this run.
    #[arg(long, value_name = "COUNT")]
    pub workers: Option<usize>,

    /// Print per-state counts instead of draining.
    #[arg(long, action = clap::ArgAction::SetTrue, conflicts_with = "purge")]
    pub status: bool,

    /// Delete finished rows instead of draining.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub purge: bool,
}

#[derive(Debug, Args, Clone)]
pub struct InvalidateArgs {
    /// Tags whose content changed.
    #[arg(value_name = "TAG", required = true)]
    pub tags: Vec<String>,
}
