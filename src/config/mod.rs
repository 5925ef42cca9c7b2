//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{num::NonZeroUsize, path::PathBuf, str::FromStr};

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::{
    application::render::{HighlightOptions, RenderOptions},
    cache::CacheBackend,
};

const LOCAL_CONFIG_BASENAME: &str = "hubdown";
const DEFAULT_CACHE_DIR: &str = ".hubdown-cache";
const DEFAULT_MEMORY_CAPACITY: usize = 256;
const DEFAULT_PIPELINE_CAPACITY: usize = 16;

/// Command-line arguments for the hubdown binary.
#[derive(Debug, Parser)]
#[command(
    name = "hubdown",
    version,
    about = "Render Markdown to HTML with anchors, emoji, and highlighting"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "HUBDOWN_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Render a Markdown file (or stdin) and print the HTML.
    Render(RenderArgs),
    /// Print the cache key a render of the input would use.
    Key(KeyArgs),
}

#[derive(Debug, Args, Clone)]
pub struct RenderArgs {
    /// Markdown file to render; `-` or nothing reads stdin.
    #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub input: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: RenderOverrides,

    #[command(flatten)]
    pub cache: CacheOverrides,

    #[command(flatten)]
    pub logging: LoggingOverrides,

    /// Print the full result (content plus frontmatter) as JSON.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub json: bool,
}

#[derive(Debug, Args, Clone)]
pub struct KeyArgs {
    /// Markdown file to hash; `-` or nothing reads stdin.
    #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub input: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: RenderOverrides,

    #[command(flatten)]
    pub logging: LoggingOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct RenderOverrides {
    /// Extract a leading YAML frontmatter block.
    #[arg(
        long = "frontmatter",
        value_name = "BOOL",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub frontmatter: Option<bool>,

    /// Render fences in unknown languages as plain text instead of failing.
    #[arg(
        long = "ignore-missing",
        value_name = "BOOL",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub ignore_missing: Option<bool>,

    /// Pass raw HTML through; `false` sanitizes the output.
    #[arg(
        long = "allow-dangerous-html",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub allow_dangerous_html: Option<bool>,

    /// Override the highlight span class prefix.
    #[arg(long = "highlight-prefix", value_name = "PREFIX")]
    pub highlight_prefix: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct CacheOverrides {
    /// Override the cache backend (none|memory|file).
    #[arg(long = "cache", value_name = "BACKEND")]
    pub backend: Option<String>,

    /// Cache directory; selects the file backend unless `--cache` says otherwise.
    #[arg(long = "cache-dir", value_name = "DIR", value_hint = ValueHint::DirPath)]
    pub directory: Option<PathBuf>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct LoggingOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,
}

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub render: RenderSettings,
    pub cache: CacheSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

/// Render defaults applied to every document the binary processes.
#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub frontmatter: bool,
    pub ignore_missing: bool,
    pub allow_dangerous_html: bool,
    pub highlight_prefix: Option<String>,
}

impl RenderSettings {
    /// Options that only set what differs from the library defaults, so the
    /// derived cache key matches a library call with the same intent.
    pub fn to_options(&self) -> RenderOptions {
        let mut options = RenderOptions::new();
        if self.frontmatter {
            options.frontmatter = Some(true);
        }
        if !self.allow_dangerous_html {
            options.allow_dangerous_html = Some(false);
        }
        if self.ignore_missing || self.highlight_prefix.is_some() {
            options.highlight = Some(HighlightOptions {
                ignore_missing: self.ignore_missing.then_some(true),
                prefix: self.highlight_prefix.clone(),
                ..Default::default()
            });
        }
        options
    }
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub backend: CacheBackend,
    pub memory_capacity: NonZeroUsize,
    pub directory: PathBuf,
    pub pipeline_capacity: NonZeroUsize,
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
    let mut builder =
        Config::builder().add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix("HUBDOWN")
            .prefix_separator("__")
            .separator("__"),
    );

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match &cli.command {
        Command::Render(args) => {
            raw.apply_render_overrides(&args.overrides);
            raw.apply_cache_overrides(&args.cache);
            raw.apply_logging_overrides(&args.logging);
        }
        Command::Key(args) => {
            raw.apply_render_overrides(&args.overrides);
            raw.apply_logging_overrides(&args.logging);
        }
    }

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
    logging: RawLoggingSettings,
    render: RawRenderSettings,
    cache: RawCacheSettings,
}

impl RawSettings {
    fn apply_render_overrides(&mut self, overrides: &RenderOverrides) {
        if let Some(value) = overrides.frontmatter {
            self.render.frontmatter = Some(value);
        }
        if let Some(value) = overrides.ignore_missing {
            self.render.ignore_missing = Some(value);
        }
        if let Some(value) = overrides.allow_dangerous_html {
            self.render.allow_dangerous_html = Some(value);
        }
        if let Some(prefix) = overrides.highlight_prefix.as_ref() {
            self.render.highlight_prefix = Some(prefix.clone());
        }
    }

    fn apply_cache_overrides(&mut self, overrides: &CacheOverrides) {
        if let Some(backend) = overrides.backend.as_ref() {
            self.cache.backend = Some(backend.clone());
        }
        if let Some(dir) = overrides.directory.as_ref() {
            self.cache.directory = Some(dir.clone());
            if overrides.backend.is_none() {
                self.cache.backend = Some(CacheBackend::File.to_string());
            }
        }
    }

    fn apply_logging_overrides(&mut self, overrides: &LoggingOverrides) {
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
            logging,
            render,
            cache,
        } = raw;

        let logging = build_logging_settings(logging)?;
        let render = build_render_settings(render)?;
        let cache = build_cache_settings(cache)?;

        Ok(Self {
            logging,
            render,
            cache,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    // Output goes to stdout, so stay quiet unless asked.
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::WARN,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_render_settings(render: RawRenderSettings) -> Result<RenderSettings, LoadError> {
    let highlight_prefix = match render.highlight_prefix {
        Some(prefix) if prefix.chars().any(char::is_whitespace) => {
            return Err(LoadError::invalid(
                "render.highlight_prefix",
                "prefix must not contain whitespace",
            ));
        }
        other => other,
    };

    Ok(RenderSettings {
        frontmatter: render.frontmatter.unwrap_or(false),
        ignore_missing: render.ignore_missing.unwrap_or(false),
        allow_dangerous_html: render.allow_dangerous_html.unwrap_or(true),
        highlight_prefix,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let backend = match cache.backend {
        Some(value) => CacheBackend::from_str(&value)
            .map_err(|reason| LoadError::invalid("cache.backend", reason))?,
        None => CacheBackend::None,
    };

    let directory = cache
        .directory
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR));
    if directory.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "cache.directory",
            "path must not be empty",
        ));
    }

    let memory_capacity = non_zero_usize(
        cache.memory_capacity.unwrap_or(DEFAULT_MEMORY_CAPACITY),
        "cache.memory_capacity",
    )?;
    let pipeline_capacity = non_zero_usize(
        cache.pipeline_capacity.unwrap_or(DEFAULT_PIPELINE_CAPACITY),
        "cache.pipeline_capacity",
    )?;

    Ok(CacheSettings {
        backend,
        memory_capacity,
        directory,
        pipeline_capacity,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRenderSettings {
    frontmatter: Option<bool>,
    ignore_missing: Option<bool>,
    allow_dangerous_html: Option<bool>,
    highlight_prefix: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    backend: Option<String>,
    memory_capacity: Option<usize>,
    directory: Option<PathBuf>,
    pipeline_capacity: Option<usize>,
}

fn non_zero_usize(value: usize, key: &'static str) -> Result<NonZeroUsize, LoadError> {
    NonZeroUsize::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

#[cfg(test)]
mod tests;
