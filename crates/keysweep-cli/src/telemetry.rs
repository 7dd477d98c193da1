//! # Telemetry
//!
//! Console logging is always on: a `tracing-subscriber` registry filtered by
//! `RUST_LOG` (default `info`) with a pretty `fmt` layer.
//!
//! ## Feature matrix
//!
//! - `tracing`: Enables log events from the scanner library and this binary.
//! - `metrics`: Enables OpenTelemetry metrics, exported to stdout every five
//!   seconds.
//!
//! ## Metrics
//!
//! Counters are fed from the coordinator's progress snapshots, so they lag
//! the workers by at most one report interval:
//!
//! - `probes`: candidates probed, whatever the outcome
//! - `probe_failures`: probes that got no response
//! - `malformed_responses`: responses without a boolean match flag
//! - `matches`: candidates the endpoint accepted
//! - `scan_duration` (ms): recorded once per completed scan
//!
//! ```bash
//! cargo run --features metrics -- --target http://127.0.0.1:8080/check
//! ```

use keysweep::Counts;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(feature = "metrics")]
use opentelemetry::{
    InstrumentationScope, KeyValue,
    metrics::{Counter, Histogram, Meter},
};
#[cfg(feature = "metrics")]
use opentelemetry_sdk::{Resource, metrics as sdkmetrics};
#[cfg(feature = "metrics")]
use opentelemetry_semantic_conventions as semvcns;
#[cfg(feature = "metrics")]
use std::sync::OnceLock;

pub struct TelemetryProviders {
    #[cfg(feature = "metrics")]
    pub meter_provider: sdkmetrics::SdkMeterProvider,
}

impl TelemetryProviders {
    /// Flushes pending metrics. Errors are reported on stderr since logging
    /// may already be unusable at this point.
    pub fn shutdown(self) {
        #[cfg(feature = "metrics")]
        {
            if let Err(err) = self.meter_provider.force_flush() {
                eprintln!("Error flushing metrics: {err:#?}");
            }
            if let Err(err) = self.meter_provider.shutdown() {
                eprintln!("Error shutting down meter: {err:#?}");
            }
        }
    }
}

pub fn init_telemetry(hide_timestamps: bool) -> anyhow::Result<TelemetryProviders> {
    #[cfg(feature = "metrics")]
    let meter_provider = init_metrics();

    let timed = (!hide_timestamps).then(|| {
        tracing_subscriber::fmt::layer()
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_line_number(true)
            .with_target(false)
            .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
            .pretty()
    });
    let untimed = hide_timestamps.then(|| {
        tracing_subscriber::fmt::layer()
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_line_number(true)
            .with_target(false)
            .without_time()
            .pretty()
    });

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(timed)
        .with(untimed)
        .try_init()?;

    #[cfg(feature = "metrics")]
    {
        opentelemetry::global::set_meter_provider(meter_provider.clone());
        let scope = InstrumentationScope::builder("keysweep")
            .with_version(env!("CARGO_PKG_VERSION"))
            .with_schema_url(semvcns::SCHEMA_URL)
            .build();
        init_metric_handles(opentelemetry::global::meter_with_scope(scope));
    }

    Ok(TelemetryProviders {
        #[cfg(feature = "metrics")]
        meter_provider,
    })
}

#[cfg(feature = "metrics")]
fn resource() -> Resource {
    Resource::builder()
        .with_service_name("keysweep")
        .with_schema_url(
            [KeyValue::new(
                semvcns::resource::SERVICE_VERSION,
                env!("CARGO_PKG_VERSION"),
            )],
            semvcns::SCHEMA_URL,
        )
        .build()
}

#[cfg(feature = "metrics")]
fn init_metrics() -> sdkmetrics::SdkMeterProvider {
    let exporter = opentelemetry_stdout::MetricExporter::default();
    let reader = sdkmetrics::PeriodicReader::builder(exporter)
        .with_interval(std::time::Duration::from_secs(5))
        .build();

    sdkmetrics::SdkMeterProvider::builder()
        .with_resource(resource())
        .with_reader(reader)
        .build()
}

#[cfg(feature = "metrics")]
static PROBES: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static PROBE_FAILURES: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static MALFORMED_RESPONSES: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static MATCHES: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static SCAN_DURATION_MS: OnceLock<Histogram<f64>> = OnceLock::new();

#[cfg(feature = "metrics")]
fn init_metric_handles(meter: Meter) {
    let _ = PROBES.set(
        meter
            .u64_counter("probes")
            .with_description("Candidates probed")
            .build(),
    );

    let _ = PROBE_FAILURES.set(
        meter
            .u64_counter("probe_failures")
            .with_description("Probes that received no response")
            .build(),
    );

    let _ = MALFORMED_RESPONSES.set(
        meter
            .u64_counter("malformed_responses")
            .with_description("Responses without a boolean match flag")
            .build(),
    );

    let _ = MATCHES.set(
        meter
            .u64_counter("matches")
            .with_description("Candidates accepted by the endpoint")
            .build(),
    );

    let _ = SCAN_DURATION_MS.set(
        meter
            .f64_histogram("scan_duration")
            .with_unit("ms")
            .with_description("Wall-clock duration of a completed scan")
            .build(),
    );
}

// Convenience functions that compile to no-ops when metrics are disabled
#[cfg(feature = "metrics")]
pub fn record_counts(delta: Counts) {
    let add = |handle: &OnceLock<Counter<u64>>, value: u64| {
        if let Some(counter) = handle.get() {
            counter.add(value, &[]);
        }
    };
    add(&PROBES, delta.requests());
    add(&PROBE_FAILURES, delta.failed);
    add(&MALFORMED_RESPONSES, delta.malformed);
    add(&MATCHES, delta.found);
}

#[cfg(not(feature = "metrics"))]
pub fn record_counts(_delta: Counts) {}

#[cfg(feature = "metrics")]
pub fn record_scan_duration(duration_ms: f64) {
    if let Some(histogram) = SCAN_DURATION_MS.get() {
        histogram.record(duration_ms, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn record_scan_duration(_duration_ms: f64) {}
