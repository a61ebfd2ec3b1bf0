use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::{
    error::InfraError,
    renderer::{
        METRIC_FRAGMENT_ERRORS, METRIC_FRAGMENT_ITEM_FAILURES, METRIC_FRAGMENT_REQUEST_MS,
        METRIC_FRAGMENT_REQUESTS,
    },
};

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    // Logs go to stderr; stdout carries command output such as rendered fragments.
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

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_FRAGMENT_REQUESTS,
            Unit::Count,
            "Total number of calls to the rendering service, by mode."
        );
        describe_counter!(
            METRIC_FRAGMENT_ERRORS,
            Unit::Count,
            "Total number of failed rendering service calls, by mode and error kind."
        );
        describe_counter!(
            METRIC_FRAGMENT_ITEM_FAILURES,
            Unit::Count,
            "Total number of fragments reported as failed inside successful batches."
        );
        describe_histogram!(
            METRIC_FRAGMENT_REQUEST_MS,
            Unit::Milliseconds,
            "Rendering service round-trip latency in milliseconds."
        );
    });
}
