use std::{
    io::IsTerminal,
    num::NonZeroUsize,
    process,
    sync::Arc,
    time::Instant,
};

use static_regen::{
    application::{
        error::AppError,
        generator::{DeleteScope, GenerateOptions, GenerateOutcome, GenerationMode, StaticGenerator},
        jobs::{QueueWorkerPool, enqueue_task, queue_status},
        report::{BatchReport, TaskOutcome},
        repos::{QueueRepo, TagInvalidationRepo},
        resolver::BaseUrlRewriter,
    },
    cache::{CacheConfig, CacheIndex},
    config::{self, Command, ConfirmArgs, Settings},
    domain::entities::RegenerationTask,
    infra::{
        db::SqliteRepositories, error::InfraError, files::ArtifactStore,
        http_resolver::HttpPathResolver, manifest::ManifestEnumerator, telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(error.exit_code());
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli().map_err(|err| {
        AppError::from(InfraError::configuration(format!(
            "failed to load configuration: {err}"
        )))
    })?;

    telemetry::init(&settings.logging)?;
    let started = Instant::now();
    let runtime = Runtime::build(&settings).await?;

    match cli_args.command {
        Command::Delete(args) => {
            let scope = match (args.pages, args.esi) {
                (true, _) => DeleteScope::Pages,
                (_, true) => DeleteScope::Fragments,
                _ => DeleteScope::All,
            };
            let prompt = format!(
                "Delete {} under {}?",
                scope_label(scope),
                settings.site.output_dir.display()
            );
            if !confirm(&prompt, &args.confirm)? {
                return Ok(());
            }

            let summary = runtime.generator.delete_all(scope).await?;
            println!(
                "Deleted {} files and {} index entries in {:.2}s",
                summary.files_removed,
                summary.entries_removed,
                started.elapsed().as_secs_f64()
            );
        }
        Command::GenerateAll(args) => {
            let mode = if args.full {
                let prompt = format!(
                    "Delete every page under {} and regenerate the site?",
                    settings.site.output_dir.display()
                );
                if !confirm(&prompt, &args.confirm)? {
                    return Ok(());
                }
                GenerationMode::Full
            } else {
                GenerationMode::Incremental
            };

            let report = runtime.generator.generate_all(mode).await?;
            print_report(&report);
        }
        Command::GenerateType(args) => {
            let report = runtime
                .generator
                .generate_type(&args.content_type, args.start, args.length)
                .await?;
            print_report(&report);
        }
        Command::GeneratePage(args) => {
            let options = GenerateOptions {
                generate_path: args.generate_path,
                emit_fragments: !args.no_fragments,
                honor_exclusions: !args.ignore_exclusions,
                force: args.force,
            };
            let outcome = runtime.generator.generate_page(&args.path, options).await?;
            let elapsed = started.elapsed().as_secs_f64();
            match outcome {
                GenerateOutcome::Written { location, indexed } => println!(
                    "Wrote {} ({}) in {elapsed:.2}s",
                    location.display(),
                    if indexed { "indexed" } else { "not indexed" }
                ),
                GenerateOutcome::AlreadyCached => {
                    println!("{} is already cached ({elapsed:.2}s)", args.path)
                }
            }
        }
        Command::Enqueue(args) => {
            let task = if args.delete {
                RegenerationTask::delete(args.path)
            } else {
                match args.generate_path {
                    Some(alternate) => RegenerationTask::create(args.path).with_generate_path(alternate),
                    None => RegenerationTask::create(args.path),
                }
            };
            let id = enqueue_task(runtime.repositories.as_ref(), task).await?;
            println!("Enqueued task {id}");
        }
        Command::ProcessQueue(args) => {
            if args.status {
                let status = queue_status(runtime.repositories.as_ref()).await?;
                println!("{status}");
                return Ok(());
            }
            if args.purge {
                let purged = runtime.repositories.purge_finished().await?;
                println!(
                    "Purged {purged} finished tasks in {:.2}s",
                    started.elapsed().as_secs_f64()
                );
                return Ok(());
            }

            let workers = match args.workers {
                Some(count) => NonZeroUsize::new(count)
                    .ok_or_else(|| AppError::validation("--workers must be greater than zero"))?,
                None => settings.jobs.concurrency,
            };
            let pool = QueueWorkerPool::new(
                runtime.repositories.clone(),
                Arc::clone(&runtime.generator),
                workers,
                settings.jobs.stale_claim,
            );
            let report = pool.process_all().await?;
            print_report(&report);
        }
        Command::Gc => {
            let removed = runtime.generator.collect_garbage().await?;
            println!(
                "Removed {} stale artifacts in {:.2}s",
                removed.len(),
                started.elapsed().as_secs_f64()
            );
        }
        Command::Invalidate(args) => {
            runtime.repositories.invalidate_tags(&args.tags).await?;
            info!(tags = ?args.tags, "tags invalidated");
            println!("Invalidated {} tags", args.tags.len());
        }
    }

    Ok(())
}

struct Runtime {
    repositories: Arc<SqliteRepositories>,
    generator: Arc<StaticGenerator>,
}

impl Runtime {
    async fn build(settings: &Settings) -> Result<Self, AppError> {
        let pool = SqliteRepositories::connect(
            &settings.database.url,
            settings.database.max_connections.get(),
        )
        .await
        .map_err(|err| InfraError::database(err.to_string()))?;
        SqliteRepositories::run_migrations(&pool)
            .await
            .map_err(|err| InfraError::Migration(err.to_string()))?;

        let repositories = Arc::new(SqliteRepositories::new(pool));
        repositories
            .health_check()
            .await
            .map_err(|err| InfraError::database(err.to_string()))?;

        let cache_config = CacheConfig::from_settings(settings);
        let index = Arc::new(CacheIndex::new(
            repositories.clone(),
            repositories.clone(),
            cache_config.exclusion_filter(),
        ));
        let store = ArtifactStore::new(&settings.site.output_dir, &settings.site.fragments_dir);
        let resolver = Arc::new(HttpPathResolver::new(
            &settings.site.origin_url,
            &settings.site.fragments_dir,
            &settings.render,
        )?);
        let content = Arc::new(ManifestEnumerator::new(&settings.site.manifest));

        let generator = StaticGenerator::new(&cache_config, index, store, resolver, content)
            .with_render_concurrency(settings.jobs.render_concurrency.get())
            .with_hook(Arc::new(BaseUrlRewriter::new(&settings.site.base_url)));

        Ok(Self {
            repositories,
            generator: Arc::new(generator),
        })
    }
}

/// Ask before a destructive command. Non-interactive runs proceed.
fn confirm(prompt: &str, args: &ConfirmArgs) -> Result<bool, AppError> {
    if args.yes || !std::io::stdin().is_terminal() {
        return Ok(true);
    }

    let confirmed = dialoguer::Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .map_err(|err| AppError::unexpected(format!("confirmation prompt failed: {err}")))?;

    if !confirmed {
        info!("aborted by user; nothing was changed");
        println!("Aborted.");
    }
    Ok(confirmed)
}

fn scope_label(scope: DeleteScope) -> &'static str {
    match scope {
        DeleteScope::All => "all pages and fragments",
        DeleteScope::Pages => "all pages",
        DeleteScope::Fragments => "all fragments",
    }
}

fn print_report(report: &BatchReport) {
    println!("{report}");
    for item in report.failures() {
        if let TaskOutcome::Failed { reason } = &item.outcome {
            println!("  failed {} {}: {reason}", item.action.as_str(), item.path);
        }
    }
}
