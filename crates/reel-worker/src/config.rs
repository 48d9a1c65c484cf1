//! Worker configuration.

use std::time::Duration;

use crate::retry::{RetryPolicy, MAX_RETRY_BACKOFF_SECS};

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum tasks processed concurrently
    pub max_concurrent_tasks: usize,
    /// Maximum deliveries requested per fetch
    pub fetch_batch: usize,
    /// How long a fetch blocks waiting for new deliveries
    pub block: Duration,
    /// Backoff and dead-letter rule
    pub retry: RetryPolicy,
    /// How often the worker scans for stale deliveries
    pub claim_interval: Duration,
    /// Minimum idle time before a delivery can be claimed (crash recovery)
    pub claim_min_idle: Duration,
    /// How often due retries are moved back to the live stream
    pub promote_interval: Duration,
    /// Graceful shutdown timeout for in-flight tasks
    pub shutdown_timeout: Duration,
    /// Content type cover images are stored with
    pub cover_content_type: String,
    /// Port of the Prometheus exporter, if enabled
    pub metrics_port: Option<u16>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 4,
            fetch_batch: 5,
            block: Duration::from_millis(1000),
            retry: RetryPolicy::default(),
            claim_interval: Duration::from_secs(30),
            claim_min_idle: Duration::from_secs(300), // 5 minutes
            promote_interval: Duration::from_millis(500),
            shutdown_timeout: Duration::from_secs(30),
            cover_content_type: "image/jpeg".to_string(),
            metrics_port: None,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

/// Non-zero duration from an integer env var; zero periods would stall or panic the loops.
fn env_duration(name: &str, unit: fn(u64) -> Duration) -> Option<Duration> {
    env_parse::<u64>(name).filter(|n| *n > 0).map(unit)
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_tasks: env_parse::<usize>("WORKER_MAX_TASKS")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_concurrent_tasks),
            fetch_batch: defaults.fetch_batch,
            block: env_duration("WORKER_BLOCK_MS", Duration::from_millis)
                .unwrap_or(defaults.block),
            retry: RetryPolicy {
                max_attempts: env_parse("WORKER_MAX_ATTEMPTS")
                    .unwrap_or(defaults.retry.max_attempts),
                base_delay: env_parse("WORKER_RETRY_BASE_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.retry.base_delay),
                max_delay: Duration::from_secs(
                    env_parse("WORKER_RETRY_MAX_SECS").unwrap_or(MAX_RETRY_BACKOFF_SECS),
                ),
            },
            claim_interval: env_duration("WORKER_CLAIM_INTERVAL_SECS", Duration::from_secs)
                .unwrap_or(defaults.claim_interval),
            claim_min_idle: env_duration("WORKER_CLAIM_MIN_IDLE_SECS", Duration::from_secs)
                .unwrap_or(defaults.claim_min_idle),
            promote_interval: env_duration("WORKER_PROMOTE_INTERVAL_MS", Duration::from_millis)
                .unwrap_or(defaults.promote_interval),
            shutdown_timeout: env_parse("WORKER_SHUTDOWN_TIMEOUT")
                .map(Duration::from_secs)
                .unwrap_or(defaults.shutdown_timeout),
            cover_content_type: std::env::var("WORKER_COVER_CONTENT_TYPE")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.cover_content_type),
            metrics_port: env_parse("METRICS_PORT"),
        }
    }
}
