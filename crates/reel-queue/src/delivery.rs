//! Queue contract seen by publishers and consumers.

use std::time::Duration;

use async_trait::async_trait;

use reel_models::UploadTask;

use crate::error::QueueResult;

/// A message handed to a consumer.
///
/// The body is kept raw so that a malformed envelope can still be
/// acknowledged and discarded by the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Stream entry id
    pub message_id: String,
    /// Raw task payload
    pub body: String,
    /// Failed attempts before this delivery
    pub attempt: u32,
}

/// Entry counts across the live stream, the retry set and the dead-letter stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueDepth {
    pub live: u64,
    pub retrying: u64,
    pub dead: u64,
}

/// Publishing side of the task channel.
#[async_trait]
pub trait TaskPublisher: Send + Sync {
    /// Publish a task. Returns once the broker has accepted it.
    async fn publish(&self, task: &UploadTask) -> QueueResult<String>;
}

/// Consuming side of the task channel.
#[async_trait]
pub trait TaskConsumer: Send + Sync {
    /// Read new deliveries for `consumer`, waiting up to `block`.
    async fn fetch(&self, consumer: &str, count: usize, block: Duration)
        -> QueueResult<Vec<Delivery>>;

    /// Take over deliveries another consumer left idle for at least `min_idle`.
    async fn claim_stale(
        &self,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> QueueResult<Vec<Delivery>>;

    /// Reset the idle time of a delivery still being processed by `consumer`,
    /// keeping it out of reach of [`TaskConsumer::claim_stale`].
    async fn touch(&self, consumer: &str, delivery: &Delivery) -> QueueResult<()>;

    /// Acknowledge a processed delivery.
    async fn ack(&self, delivery: &Delivery) -> QueueResult<()>;

    /// Acknowledge and discard a delivery that can never be processed.
    async fn reject(&self, delivery: &Delivery, reason: &str) -> QueueResult<()>;

    /// Acknowledge and schedule the task again after `delay` with its attempt bumped.
    async fn retry_later(&self, delivery: &Delivery, delay: Duration) -> QueueResult<()>;

    /// Acknowledge and move the task to the dead-letter stream.
    async fn dead_letter(&self, delivery: &Delivery, error: &str) -> QueueResult<()>;

    /// Move retries whose time has come back onto the live stream.
    async fn promote_due(&self, limit: usize) -> QueueResult<usize>;

    async fn depth(&self) -> QueueResult<QueueDepth>;
}
