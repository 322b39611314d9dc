use std::sync::Once;

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
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(true)
            .with_writer(std::io::stderr)
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

/// Register metric descriptions with the installed recorder. Idempotent.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "static_regen_cache_hit_total",
            Unit::Count,
            "Paths whose valid artifact was reused."
        );
        describe_counter!(
            "static_regen_cache_miss_total",
            Unit::Count,
            "Paths that needed generation because no valid artifact existed."
        );
        describe_counter!(
            "static_regen_cache_excluded_total",
            Unit::Count,
            "Paths regenerated unconditionally because an exclusion rule matched."
        );
        describe_counter!(
            "static_regen_gc_removed_total",
            Unit::Count,
            "Artifacts deleted by garbage collection."
        );
        describe_counter!(
            "static_regen_task_total",
            Unit::Count,
            "Queue tasks processed, labelled by outcome."
        );
        describe_histogram!(
            "static_regen_render_ms",
            Unit::Milliseconds,
            "Time spent in the path resolver per render."
        );
        describe_histogram!(
            "static_regen_queue_drain_ms",
            Unit::Milliseconds,
            "Wall time of a full queue drain."
        );
    });
}
