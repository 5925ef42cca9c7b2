use serial_test::serial;

use super::*;

fn render_cli(args: &[&str]) -> RenderArgs {
    let mut argv = vec!["hubdown", "render"];
    argv.extend_from_slice(args);
    match CliArgs::parse_from(argv).command {
        Command::Render(render) => render,
        other => panic!("wrong command parsed: {other:?}"),
    }
}

#[test]
fn defaults_are_quiet_and_cacheless() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.logging.level, LevelFilter::WARN);
    assert!(matches!(settings.logging.format, LogFormat::Compact));
    assert_eq!(settings.cache.backend, CacheBackend::None);
    assert_eq!(settings.cache.memory_capacity.get(), DEFAULT_MEMORY_CAPACITY);
    assert_eq!(settings.cache.pipeline_capacity.get(), DEFAULT_PIPELINE_CAPACITY);
    assert!(!settings.render.frontmatter);
    assert!(settings.render.allow_dangerous_html);
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.logging.level = Some("info".to_string());
    raw.render.frontmatter = Some(false);

    let args = render_cli(&["--frontmatter", "--log-level", "debug", "doc.md"]);
    raw.apply_render_overrides(&args.overrides);
    raw.apply_logging_overrides(&args.logging);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(settings.render.frontmatter);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert_eq!(args.input.as_deref(), Some(std::path::Path::new("doc.md")));
}

#[test]
fn boolish_flags_accept_explicit_values() {
    let args = render_cli(&["--ignore-missing=no", "--allow-dangerous-html", "false"]);
    assert_eq!(args.overrides.ignore_missing, Some(false));
    assert_eq!(args.overrides.allow_dangerous_html, Some(false));
    assert_eq!(args.overrides.frontmatter, None);
}

#[test]
fn cache_dir_implies_file_backend() {
    let mut raw = RawSettings::default();
    let args = render_cli(&["--cache-dir", "/tmp/hubdown", "-"]);
    raw.apply_cache_overrides(&args.cache);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.cache.backend, CacheBackend::File);
    assert_eq!(settings.cache.directory, PathBuf::from("/tmp/hubdown"));
}

#[test]
fn explicit_cache_backend_wins_over_cache_dir() {
    let mut raw = RawSettings::default();
    let args = render_cli(&["--cache", "memory", "--cache-dir", "/tmp/hubdown"]);
    raw.apply_cache_overrides(&args.cache);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.cache.backend, CacheBackend::Memory);
}

#[test]
fn unknown_cache_backend_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.backend = Some("redis".to_string());

    let err = Settings::from_raw(raw).expect_err("invalid backend");
    assert!(matches!(err, LoadError::Invalid { key: "cache.backend", .. }));
}

#[test]
fn zero_capacities_are_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.memory_capacity = Some(0);

    let err = Settings::from_raw(raw).expect_err("zero capacity");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.memory_capacity",
            ..
        }
    ));
}

#[test]
fn invalid_log_level_is_rejected() {
    let mut raw = RawSettings::default();
    raw.logging.level = Some("chatty".to_string());

    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid {
            key: "logging.level",
            ..
        })
    ));
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let args = render_cli(&["--log-json", "true"]);
    raw.apply_logging_overrides(&args.logging);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn default_render_settings_produce_empty_options() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");
    let options = settings.render.to_options();

    assert_eq!(options.frontmatter, None);
    assert_eq!(options.allow_dangerous_html, None);
    assert!(options.highlight.is_none());
}

#[test]
fn render_settings_map_onto_options() {
    let mut raw = RawSettings::default();
    raw.render.ignore_missing = Some(true);
    raw.render.allow_dangerous_html = Some(false);
    raw.render.highlight_prefix = Some("tok-".to_string());
    let settings = Settings::from_raw(raw).expect("valid settings");
    let options = settings.render.to_options();

    let highlight = options.highlight.expect("highlight options");
    assert_eq!(highlight.ignore_missing, Some(true));
    assert_eq!(highlight.prefix.as_deref(), Some("tok-"));
    assert_eq!(options.allow_dangerous_html, Some(false));
}

#[test]
fn parse_key_arguments() {
    let args = CliArgs::parse_from(["hubdown", "key", "--frontmatter", "notes.md"]);
    match args.command {
        Command::Key(key) => {
            assert_eq!(key.overrides.frontmatter, Some(true));
            assert_eq!(key.input.as_deref(), Some(std::path::Path::new("notes.md")));
        }
        other => panic!("wrong command parsed: {other:?}"),
    }
}

#[test]
#[serial]
fn environment_layer_sits_between_file_and_cli() {
    // SAFETY: `#[serial]` keeps environment mutation to one test at a time.
    unsafe {
        std::env::set_var("HUBDOWN__RENDER__FRONTMATTER", "true");
        std::env::set_var("HUBDOWN__CACHE__BACKEND", "memory");
        std::env::set_var("HUBDOWN__CACHE__MEMORY_CAPACITY", "8");
    }

    let from_env = load(&CliArgs::parse_from(["hubdown", "render", "-"]));
    let from_cli = load(&CliArgs::parse_from([
        "hubdown",
        "render",
        "--frontmatter=false",
        "--cache",
        "none",
        "-",
    ]));

    unsafe {
        std::env::remove_var("HUBDOWN__RENDER__FRONTMATTER");
        std::env::remove_var("HUBDOWN__CACHE__BACKEND");
        std::env::remove_var("HUBDOWN__CACHE__MEMORY_CAPACITY");
    }

    let from_env = from_env.expect("env settings");
    assert!(from_env.render.frontmatter);
    assert_eq!(from_env.cache.backend, CacheBackend::Memory);
    assert_eq!(from_env.cache.memory_capacity.get(), 8);

    let from_cli = from_cli.expect("cli settings");
    assert!(!from_cli.render.frontmatter);
    assert_eq!(from_cli.cache.backend, CacheBackend::None);
}
