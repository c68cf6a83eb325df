//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define proxy metrics (requests, latency, cache results, upstream failures)
//! - Expose Prometheus-compatible metrics endpoint
//! - Track per-origin and per-capability metrics
//!
//! # Metrics
//! - `trickster_requests_total` (counter): requests by origin, capability, status
//! - `trickster_request_duration_seconds` (histogram): latency distribution
//! - `trickster_cache_lookups_total` (counter): hit/miss/bypass by origin
//! - `trickster_upstream_failures_total` (counter): origin errors by kind
//! - `trickster_startup_stage` (gauge): last completed startup stage
//!
//! # Design Decisions
//! - Counters recorded before the exporter is installed are dropped
//! - The startup stage is also held in an atomic and republished once the
//!   exporter is installed, so early stages are not lost
//! - Endpoint startup is fire-and-forget; failures are only logged

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use tokio::runtime::Handle;

/// Install the Prometheus recorder and its HTTP listener on the current runtime.
pub fn install_exporter(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()
}

/// Start the metrics endpoint in the background. Errors are logged, never returned.
pub fn spawn_endpoint(handle: &Handle, addr: SocketAddr) {
    handle.spawn(async move {
        match install_exporter(addr) {
            Ok(()) => {
                STARTUP_STAGE.publish();
                tracing::info!(address = %addr, "metrics http endpoint starting");
            }
            Err(e) => tracing::error!(
                address = %addr,
                detail = %e,
                "error starting metrics http endpoint"
            ),
        }
    });
}

/// Record a completed proxied request.
pub fn record_request(origin: &str, capability: &str, status: u16, start: Instant) {
    counter!(
        "trickster_requests_total",
        "origin" => origin.to_string(),
        "capability" => capability.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!(
        "trickster_request_duration_seconds",
        "origin" => origin.to_string(),
        "capability" => capability.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}

/// Record the outcome of a cache lookup (`hit`, `miss`, `bypass`).
pub fn record_cache_lookup(origin: &str, capability: &str, result: &'static str) {
    counter!(
        "trickster_cache_lookups_total",
        "origin" => origin.to_string(),
        "capability" => capability.to_string(),
        "result" => result
    )
    .increment(1);
}

/// Record a failed origin request (`timeout`, `connect`, ...).
pub fn record_upstream_failure(origin: &str, kind: &'static str) {
    counter!(
        "trickster_upstream_failures_total",
        "origin" => origin.to_string(),
        "kind" => kind
    )
    .increment(1);
}

const STARTUP_STAGE_GAUGE: &str = "trickster_startup_stage";

static STARTUP_STAGE: StageGauge = StageGauge::new();

/// Last completed startup stage, kept across recorder installation.
#[derive(Debug, Default)]
pub struct StageGauge {
    stage: AtomicU8,
}

impl StageGauge {
    pub const fn new() -> Self {
        Self {
            stage: AtomicU8::new(0),
        }
    }

    /// Remember `stage` and set the gauge.
    pub fn record(&self, stage: u8) {
        self.stage.store(stage, Ordering::Release);
        gauge!(STARTUP_STAGE_GAUGE).set(f64::from(stage));
    }

    pub fn current(&self) -> u8 {
        self.stage.load(Ordering::Acquire)
    }

    /// Set the gauge from the remembered stage.
    pub fn publish(&self) {
        let stage = self.current();
        if stage > 0 {
            gauge!(STARTUP_STAGE_GAUGE).set(f64::from(stage));
        }
    }
}

/// Record the startup stage just reached.
pub fn record_startup_stage(stage: u8) {
    STARTUP_STAGE.record(stage);
}
