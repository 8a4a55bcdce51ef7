use std::sync::Once;

use metrics::{Unit, describe_counter};
use tracing::Subscriber;
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
};

use crate::application::fixup::METRIC_FIXUP_RECONCILED_TOTAL;
use crate::application::jobs::METRIC_FETCH_STORED_TOTAL;
use crate::cache::{
    METRIC_CACHE_PRESENCE_SHORTCUT_TOTAL, METRIC_CACHE_READ_TOTAL, METRIC_CACHE_WRITE_TOTAL,
};
use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

const COUNTERS: [(&str, &str); 5] = [
    (
        METRIC_CACHE_READ_TOTAL,
        "Plan cache reads that reached storage, labelled by hit or miss.",
    ),
    (
        METRIC_CACHE_PRESENCE_SHORTCUT_TOTAL,
        "Plan cache reads answered as absent without touching storage.",
    ),
    (METRIC_CACHE_WRITE_TOTAL, "Plan cache entries written."),
    (
        METRIC_FIXUP_RECONCILED_TOTAL,
        "Cache entries whose plans changed during reconciliation.",
    ),
    (METRIC_FETCH_STORED_TOTAL, "Dates stored by the plan fetch job."),
];

/// Install the process-wide subscriber and describe the crate's counters.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    METRIC_DESCRIPTIONS.call_once(|| {
        for (name, help) in COUNTERS {
            describe_counter!(name, Unit::Count, help);
        }
    });

    let filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(filter)
        .with(ErrorLayer::default())
        .with(output_layer(logging.format))
        .try_init()
        .map_err(|err| InfraError::telemetry(format!("subscriber already installed: {err}")))
}

fn output_layer<S>(format: LogFormat) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'span> LookupSpan<'span> + 'static,
{
    match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().boxed(),
    }
}
