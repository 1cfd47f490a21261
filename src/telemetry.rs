use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};
use crate::error::CacheError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
///
/// Intended for hosts that embed the engine standalone; applications with
/// their own subscriber should skip this and only rely on the `staticcache`
/// tracing targets.
pub fn init(logging: &LoggingSettings) -> Result<(), CacheError> {
    describe_metrics();

    let env_filter = EnvFilter::builder().parse_lossy(&logging.level);

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| CacheError::telemetry(format!("failed to install tracing subscriber: {err}")))
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "staticcache_hit_total",
            Unit::Count,
            "Total number of requests served from the page cache."
        );
        describe_counter!(
            "staticcache_miss_total",
            Unit::Count,
            "Total number of requests that fell through to the renderer."
        );
        describe_counter!(
            "staticcache_store_total",
            Unit::Count,
            "Total number of rendered responses captured into the cache."
        );
        describe_counter!(
            "staticcache_store_error_total",
            Unit::Count,
            "Total number of capture attempts that failed to persist."
        );
        describe_histogram!(
            "staticcache_hit_elapsed_seconds",
            Unit::Seconds,
            "Elapsed time from request start to serving a cached response."
        );
    });
}
