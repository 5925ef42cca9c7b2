use std::{io, sync::Once};

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
///
/// Events are written to stderr; stdout carries rendered output.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(io::stderr)
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(io::stderr)
            .with_target(true)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "hubdown_cache_hit_total",
            Unit::Count,
            "Total number of renders served from the cache."
        );
        describe_counter!(
            "hubdown_cache_miss_total",
            Unit::Count,
            "Total number of cache lookups that found nothing."
        );
        describe_counter!(
            "hubdown_cache_error_total",
            Unit::Count,
            "Total number of cache lookups that failed and fell back to rendering."
        );
        describe_counter!(
            "hubdown_cache_put_error_total",
            Unit::Count,
            "Total number of rendered documents the cache failed to store."
        );
        describe_counter!(
            "hubdown_cache_evict_total",
            Unit::Count,
            "Total number of memory cache evictions due to capacity."
        );
        describe_histogram!(
            "hubdown_render_ms",
            Unit::Milliseconds,
            "Uncached render latency in milliseconds."
        );
    });
}
