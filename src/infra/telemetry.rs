use std::sync::Once;

use metrics::{Unit, describe_counter};
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
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
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

/// Register descriptions for every counter the proxy emits. Idempotent.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "wombat_network_success_total",
            Unit::Count,
            "Total number of requests the network completed, any status."
        );
        describe_counter!(
            "wombat_network_failure_total",
            Unit::Count,
            "Total number of requests the network failed outright."
        );
        describe_counter!(
            "wombat_cache_fallback_hit_total",
            Unit::Count,
            "Total number of network failures answered from the cache."
        );
        describe_counter!(
            "wombat_cache_fallback_miss_total",
            Unit::Count,
            "Total number of network failures with nothing cached."
        );
        describe_counter!(
            "wombat_cache_write_total",
            Unit::Count,
            "Total number of responses written to a cache store."
        );
        describe_counter!(
            "wombat_cache_write_failed_total",
            Unit::Count,
            "Total number of cache writes that were rejected or failed."
        );
        describe_counter!(
            "wombat_cache_lookup_failed_total",
            Unit::Count,
            "Total number of cache stores skipped during a lookup because they could not be read."
        );
        describe_counter!(
            "wombat_cache_evict_total",
            Unit::Count,
            "Total number of in-memory cache evictions due to capacity."
        );
    });
}
