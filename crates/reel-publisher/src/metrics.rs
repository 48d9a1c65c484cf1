//! Publish path metrics.

use metrics::{counter, histogram};

pub mod names {
    pub const TASKS_PUBLISHED_TOTAL: &str = "reel_ingest_tasks_published_total";
    pub const PUBLISH_FAILURES_TOTAL: &str = "reel_ingest_publish_failures_total";
    pub const UPLOAD_BYTES: &str = "reel_ingest_upload_bytes";
}

/// Record a task handed to the queue.
pub fn record_published(bytes: usize) {
    counter!(names::TASKS_PUBLISHED_TOTAL).increment(1);
    histogram!(names::UPLOAD_BYTES).record(bytes as f64);
}

/// Record a publish failure at `stage`.
pub fn record_publish_failure(stage: &'static str) {
    let labels = [("stage", stage)];
    counter!(names::PUBLISH_FAILURES_TOTAL, &labels).increment(1);
}
