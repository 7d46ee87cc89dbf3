use crate::config::{LogFormat, TelemetryConfig};
use metrics::{describe_counter, describe_histogram, Unit};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub const BATCHES_FETCHED: &str = "harvester_batches_fetched";
pub const FETCH_DURATION_MS: &str = "harvester_fetch_duration_ms";
pub const RECORDS_FORWARDED: &str = "harvester_records_forwarded";
pub const RECORDS_DELETED: &str = "harvester_records_deleted";
pub const RECORDS_DROPPED: &str = "harvester_records_dropped";
pub const JOBS_COMPLETED: &str = "harvester_jobs_completed";

/// OAI-PMH pages range from a few milliseconds to minutes for large
/// preservation exports.
const FETCH_DURATION_BUCKETS_MS: &[f64] = &[
    50.0, 100.0, 250.0, 500.0, 1_000.0, 2_500.0, 5_000.0, 10_000.0, 30_000.0, 60_000.0, 120_000.0,
];

/// Sets up logging and, when enabled, the Prometheus endpoint.
pub fn init(config: &TelemetryConfig) -> anyhow::Result<()> {
    // RUST_LOG wins over the configured level
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let fmt_layer = match config.log_format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .boxed(),
        LogFormat::Pretty => fmt::layer().pretty().with_thread_names(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    if config.metrics_enabled {
        let addr: SocketAddr = ([0, 0, 0, 0], config.metrics_port).into();
        prometheus_builder()?.with_http_listener(addr).install()?;
        describe_metrics();

        info!(
            port = config.metrics_port,
            "Harvest metrics served at http://0.0.0.0:{}/metrics",
            config.metrics_port
        );
    }

    Ok(())
}

fn prometheus_builder() -> anyhow::Result<PrometheusBuilder> {
    Ok(PrometheusBuilder::new().set_buckets_for_metric(
        Matcher::Full(FETCH_DURATION_MS.to_string()),
        FETCH_DURATION_BUCKETS_MS,
    )?)
}

/// Registers help text for every metric the harvester emits.
pub fn describe_metrics() {
    describe_counter!(BATCHES_FETCHED, Unit::Count, "ListRecords pages fetched, per target");
    describe_histogram!(
        FETCH_DURATION_MS,
        Unit::Milliseconds,
        "Time to fetch, repair and parse one ListRecords page"
    );
    describe_counter!(RECORDS_FORWARDED, Unit::Count, "Records upserted into the sink, per target");
    describe_counter!(RECORDS_DELETED, Unit::Count, "Deletions sent to the sink, per target");
    describe_counter!(RECORDS_DROPPED, Unit::Count, "Records rejected by the classifier, per target");
    describe_counter!(JOBS_COMPLETED, Unit::Count, "Finished harvest jobs, by outcome");
}
