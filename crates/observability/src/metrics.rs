// crates/observability/src/metrics.rs
//! Prometheus metrics, grounded on `claude-view-server::metrics`: a
//! process-global recorder installed once at startup, a fixed set of
//! described metrics, and a render function backing the `/metrics` route.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Installs the global Prometheus recorder. Returns `false` if a recorder
/// was already installed (idempotent — safe to call from test setup).
pub fn init_metrics() -> bool {
    if PROMETHEUS_HANDLE.get().is_some() {
        return false;
    }

    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();

    if metrics::set_global_recorder(recorder).is_err() {
        tracing::warn!("failed to install prometheus recorder (already set)");
        return false;
    }
    let _ = PROMETHEUS_HANDLE.set(handle);

    describe_metrics();
    tracing::info!("prometheus metrics initialized");
    true
}

fn describe_metrics() {
    describe_counter!("scoutline_http_requests_total", "Total HTTP requests handled, by route and status");
    describe_histogram!("scoutline_http_request_duration_seconds", "HTTP request latency in seconds");

    describe_histogram!("scoutline_pipeline_stage_duration_seconds", "Pipeline orchestrator stage duration in seconds, by stage");
    describe_counter!("scoutline_pipeline_stage_failures_total", "Pipeline stage failures, by stage");

    describe_gauge!("scoutline_jobs_active", "Jobs currently queued or running, by queue");
    describe_counter!("scoutline_jobs_timed_out_total", "Jobs that hit their timeout and were marked failed");

    describe_counter!("scoutline_ingest_rows_processed_total", "Rows processed by the ingestion pipeline, by step and outcome");
    describe_histogram!("scoutline_batch_poll_duration_seconds", "Wall-clock time spent polling a batch API job to completion");
}

/// Renders current metrics in Prometheus text format; `None` if
/// `init_metrics` was never called.
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|h| h.render())
}

pub fn record_stage_duration(stage: &str, elapsed: Duration) {
    metrics::histogram!("scoutline_pipeline_stage_duration_seconds", "stage" => stage.to_string()).record(elapsed.as_secs_f64());
}

pub fn record_stage_failure(stage: &str) {
    metrics::counter!("scoutline_pipeline_stage_failures_total", "stage" => stage.to_string()).increment(1);
}

pub fn record_job_timeout() {
    metrics::counter!("scoutline_jobs_timed_out_total").increment(1);
}
