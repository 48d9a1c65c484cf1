//! Prometheus metrics for the ingestion worker.

use std::net::{Ipv4Addr, SocketAddr};

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use reel_queue::QueueDepth;

/// Install the Prometheus recorder with an HTTP listener on `port`.
pub fn init_metrics(port: u16) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))
        .install()
}

/// Metric names as constants for consistency.
pub mod names {
    pub const TASKS_COMPLETED_TOTAL: &str = "reel_ingest_tasks_completed_total";
    pub const TASKS_REJECTED_TOTAL: &str = "reel_ingest_tasks_rejected_total";
    pub const TASKS_RETRIED_TOTAL: &str = "reel_ingest_tasks_retried_total";
    pub const TASKS_DEAD_LETTERED_TOTAL: &str = "reel_ingest_tasks_dead_lettered_total";
    pub const UPLOAD_DURATION_SECONDS: &str = "reel_ingest_upload_duration_seconds";
    pub const COVER_FALLBACKS_TOTAL: &str = "reel_ingest_cover_fallbacks_total";
    pub const CLEANUP_FAILURES_TOTAL: &str = "reel_ingest_cleanup_failures_total";
    pub const QUEUE_LENGTH: &str = "reel_ingest_queue_length";
    pub const RETRY_SET_LENGTH: &str = "reel_ingest_retry_set_length";
    pub const DLQ_LENGTH: &str = "reel_ingest_dlq_length";
}

pub fn record_completed(already_done: bool) {
    let labels = [("already_done", already_done.to_string())];
    counter!(names::TASKS_COMPLETED_TOTAL, &labels).increment(1);
}

pub fn record_rejected() {
    counter!(names::TASKS_REJECTED_TOTAL).increment(1);
}

pub fn record_retried(stage: &'static str) {
    let labels = [("stage", stage)];
    counter!(names::TASKS_RETRIED_TOTAL, &labels).increment(1);
}

pub fn record_dead_lettered(stage: &'static str) {
    let labels = [("stage", stage)];
    counter!(names::TASKS_DEAD_LETTERED_TOTAL, &labels).increment(1);
}

/// Record the duration of one object upload.
pub fn record_upload(kind: &'static str, success: bool, duration_secs: f64) {
    let labels = [("kind", kind), ("outcome", if success { "ok" } else { "error" })];
    histogram!(names::UPLOAD_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record a cover URL derived from the primary asset.
pub fn record_cover_fallback(reason: &'static str) {
    let labels = [("reason", reason)];
    counter!(names::COVER_FALLBACKS_TOTAL, &labels).increment(1);
}

pub fn record_cleanup_failure() {
    counter!(names::CLEANUP_FAILURES_TOTAL).increment(1);
}

pub fn set_queue_depth(depth: QueueDepth) {
    gauge!(names::QUEUE_LENGTH).set(depth.live as f64);
    gauge!(names::RETRY_SET_LENGTH).set(depth.retrying as f64);
    gauge!(names::DLQ_LENGTH).set(depth.dead as f64);
}
