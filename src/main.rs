use std::{io, path::Path, process};

use hubdown::{
    CacheKey, Hubdown,
    cache::CacheConfig,
    config::{self, Command, KeyArgs, RenderArgs, Settings},
    infra::{error::InfraError, telemetry},
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{Dispatch, Level, debug, dispatcher, error};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &InfraError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_writer(io::stderr)
        .with_max_level(Level::ERROR)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), InfraError> {
    let (cli_args, settings) = config::load_with_cli()?;
    telemetry::init(&settings.logging)?;

    match cli_args.command {
        Command::Render(args) => run_render(&settings, args).await,
        Command::Key(args) => run_key(&settings, args).await,
    }
}

async fn run_render(settings: &Settings, args: RenderArgs) -> Result<(), InfraError> {
    let markdown = read_input(args.input.as_deref()).await?;

    let cache = CacheConfig::from(&settings.cache);
    let service = Hubdown::builder()
        .maybe_cache(cache.open_store()?)
        .pipeline_capacity(cache.pipeline_capacity_non_zero())
        .build()?;

    let options = settings.render.to_options();
    let input = args.input.as_deref().unwrap_or(Path::new("-"));
    debug!(
        target = "hubdown::cli",
        op = "cli::render",
        input = %input.display(),
        input_bytes = markdown.len(),
        cache_backend = %cache.backend,
        "Rendering document"
    );
    let result = service.render(&markdown, &options).await?;

    let output = if args.json {
        let mut json = serde_json::to_string_pretty(&result)?;
        json.push('\n');
        json
    } else {
        result.content().to_string()
    };
    write_stdout(output.as_bytes()).await
}

async fn run_key(settings: &Settings, args: KeyArgs) -> Result<(), InfraError> {
    let markdown = read_input(args.input.as_deref()).await?;
    let key = CacheKey::derive(&markdown, &settings.render.to_options());
    write_stdout(format!("{key}\n").as_bytes()).await
}

async fn read_input(path: Option<&Path>) -> Result<String, InfraError> {
    match path {
        Some(path) if path != Path::new("-") => Ok(tokio::fs::read_to_string(path).await?),
        _ => {
            let mut buffer = String::new();
            tokio::io::stdin().read_to_string(&mut buffer).await?;
            Ok(buffer)
        }
    }
}

async fn write_stdout(bytes: &[u8]) -> Result<(), InfraError> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(bytes).await?;
    stdout.flush().await?;
    Ok(())
}
