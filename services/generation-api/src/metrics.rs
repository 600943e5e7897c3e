//! Prometheus metrics exposition
//!
//! Service-level series:
//!
//! - `api_requests_total` (counter): labels `route`, `status`
//! - `api_request_duration_seconds` (histogram): label `route`
//! - `api_engine_errors_total` (counter): labels `engine`, `error_type`
//!
//! The key-pool crate adds `key_pool_*` series through the same recorder.

use anyhow::Context;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

const DURATION_METRIC: &str = "api_request_duration_seconds";

/// 5ms up to the longest provider timeout we expect to configure.
const DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0,
];

fn builder() -> anyhow::Result<PrometheusBuilder> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(DURATION_METRIC.to_string()), DURATION_BUCKETS)
        .context("failed to set histogram buckets")
}

/// Install the global Prometheus recorder and return the handle `/metrics`
/// renders from.
pub fn install_recorder() -> anyhow::Result<PrometheusHandle> {
    builder()?
        .install_recorder()
        .context("failed to install Prometheus recorder")
}

/// Record a finished request.
pub fn record_request(route: &'static str, status: u16, duration_secs: f64) {
    metrics::counter!("api_requests_total", "route" => route, "status" => status.to_string())
        .increment(1);
    metrics::histogram!(DURATION_METRIC, "route" => route).record(duration_secs);
}

/// Record a failed upstream generation call.
pub fn record_engine_error(engine: &str, error_type: &'static str) {
    metrics::counter!(
        "api_engine_errors_total",
        "engine" => engine.to_string(),
        "error_type" => error_type
    )
    .increment(1);
}
