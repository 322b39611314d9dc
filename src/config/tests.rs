use super::*;

fn raw_with_base_url() -> RawSettings {
    let mut raw = RawSettings::default();
    raw.site.base_url = Some("https://example.com/".to_string());
    raw
}

#[test]
fn defaults_apply_when_only_base_url_is_set() {
    let settings = Settings::from_raw(raw_with_base_url()).expect("valid settings");

    assert_eq!(settings.site.base_url, "https://example.com");
    assert_eq!(settings.site.origin_url, "https://example.com");
    assert_eq!(
        settings.site.output_dir,
        std::env::current_dir()
            .expect("cwd")
            .join(DEFAULT_OUTPUT_DIR)
    );
    assert_eq!(settings.site.fragments_dir, DEFAULT_FRAGMENTS_DIR);
    assert_eq!(settings.database.url, DEFAULT_DATABASE_URL);
    assert_eq!(settings.jobs.concurrency.get(), 2);
    assert_eq!(settings.jobs.render_concurrency.get(), 4);
    assert_eq!(settings.jobs.stale_claim, Duration::from_secs(600));
    assert_eq!(settings.render.timeout_seconds, 30);
    assert_eq!(settings.logging.level, LevelFilter::INFO);
    assert_eq!(settings.logging.format, LogFormat::Compact);
}

#[test]
fn relative_output_dir_is_made_absolute() {
    let mut raw = raw_with_base_url();
    raw.site.output_dir = Some(PathBuf::from("public/site"));
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(settings.site.output_dir.is_absolute());
    assert!(settings.site.output_dir.ends_with("public/site"));
}

#[test]
fn base_url_is_required() {
    let err = Settings::from_raw(RawSettings::default()).expect_err("missing base url");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "site.base_url",
            ..
        }
    ));
}

#[test]
fn base_url_must_be_http() {
    let mut raw = RawSettings::default();
    raw.site.base_url = Some("ftp://example.com".to_string());
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = raw_with_base_url();
    raw.logging.level = Some("info".to_string());
    raw.site.output_dir = Some(PathBuf::from("from-file"));

    let overrides = GlobalOverrides {
        base_url: Some("http://override.test".to_string()),
        output_dir: Some(PathBuf::from("/srv/www")),
        log_level: Some("debug".to_string()),
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_global_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.site.base_url, "http://override.test");
    assert_eq!(settings.site.output_dir, PathBuf::from("/srv/www"));
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert_eq!(settings.logging.format, LogFormat::Json);
}

#[test]
fn zero_concurrency_is_rejected() {
    let mut raw = raw_with_base_url();
    raw.jobs.concurrency = Some(0);
    let err = Settings::from_raw(raw).expect_err("zero workers");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "jobs.concurrency",
            ..
        }
    ));
}

#[test]
fn non_sqlite_database_is_rejected() {
    let mut raw = raw_with_base_url();
    raw.database.url = Some("postgres://localhost/db".to_string());
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn fragments_dir_must_be_single_segment() {
    let mut raw = raw_with_base_url();
    raw.site.fragments_dir = Some("a/b".to_string());
    assert!(Settings::from_raw(raw).is_err());

    let mut raw = raw_with_base_url();
    raw.site.fragments_dir = Some("/fragments/".to_string());
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.site.fragments_dir, "fragments");
}

#[test]
fn blank_cache_entries_are_dropped() {
    let mut raw = raw_with_base_url();
    raw.cache.exclude_patterns = vec!["^/preview/".into(), "  ".into()];
    raw.cache.content_types = vec![" article ".into()];
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.cache.exclude_patterns, vec!["^/preview/"]);
    assert_eq!(settings.cache.content_types, vec!["article"]);
}

#[test]
fn parse_generate_page_flags() {
    let args = CliArgs::parse_from([
        "static-regen",
        "generate-page",
        "/about",
        "--generate-path",
        "/node/1",
        "--no-fragments",
        "--force",
    ]);

    match args.command {
        Command::GeneratePage(page) => {
            assert_eq!(page.path, "/about");
            assert_eq!(page.generate_path.as_deref(), Some("/node/1"));
            assert!(page.no_fragments);
            assert!(page.force);
            assert!(!page.ignore_exclusions);
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn global_overrides_follow_subcommand() {
    let args = CliArgs::parse_from([
        "static-regen",
        "gc",
        "--database-url",
        "sqlite://override.db",
    ]);

    assert!(matches!(args.command, Command::Gc));
    assert_eq!(
        args.overrides.database_url.as_deref(),
        Some("sqlite://override.db")
    );
}

#[test]
fn delete_scopes_are_exclusive() {
    let result = CliArgs::try_parse_from(["static-regen", "delete", "--pages", "--esi"]);
    assert!(result.is_err());

    let args = CliArgs::parse_from(["static-regen", "delete", "--esi", "-y"]);
    match args.command {
        Command::Delete(delete) => {
            assert!(delete.esi);
            assert!(delete.confirm.yes);
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn invalidate_requires_tags() {
    assert!(CliArgs::try_parse_from(["static-regen", "invalidate"]).is_err());
}
