//! Queue configuration.

use std::time::Duration;

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Prefix shared by every stream this queue owns
    pub stream_prefix: String,
    /// Ingestion class; one stream per routing key
    pub routing_key: String,
    /// Consumer group name
    pub consumer_group: String,
    /// Replicas that must confirm a publish (0 disables WAIT)
    pub min_replicas: u32,
    /// How long a publish waits for replica confirmation
    pub wait_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            stream_prefix: "reel:ingest".to_string(),
            routing_key: "video".to_string(),
            consumer_group: "reel:workers".to_string(),
            min_replicas: 0,
            wait_timeout: Duration::from_millis(1000),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            stream_prefix: std::env::var("QUEUE_STREAM_PREFIX").unwrap_or(defaults.stream_prefix),
            routing_key: std::env::var("QUEUE_ROUTING_KEY").unwrap_or(defaults.routing_key),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP")
                .unwrap_or(defaults.consumer_group),
            min_replicas: std::env::var("QUEUE_MIN_REPLICAS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.min_replicas),
            wait_timeout: std::env::var("QUEUE_WAIT_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.wait_timeout),
        }
    }

    /// Live stream tasks are published to.
    pub fn stream_name(&self) -> String {
        format!("{}:{}", self.stream_prefix, self.routing_key)
    }

    /// Sorted set holding tasks waiting for their retry time.
    pub fn retry_key(&self) -> String {
        format!("{}:retry", self.stream_name())
    }

    /// Dead-letter stream.
    pub fn dlq_stream_name(&self) -> String {
        format!("{}:dlq", self.stream_name())
    }
}
