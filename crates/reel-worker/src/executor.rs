//! Task executor.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use reel_db::{DbError, VideoStore};
use reel_models::VideoId;
use reel_queue::{Delivery, TaskConsumer};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::metrics;
use crate::pipeline::{IngestPipeline, Stage, TaskOutcome};
use crate::retry::{retry_async, FailureTracker, RetryConfig, RetryPolicy};

/// Deliveries claimed per crash-recovery scan.
const CLAIM_BATCH: usize = 5;

/// Due retries promoted per tick.
const PROMOTE_BATCH: usize = 100;

/// Floor for loop and heartbeat periods; `tokio::time::interval` rejects zero.
const MIN_LOOP_PERIOD: Duration = Duration::from_millis(10);

/// Everything a spawned task needs.
struct TaskContext {
    consumer: String,
    queue: Arc<dyn TaskConsumer>,
    pipeline: IngestPipeline,
    videos: Arc<dyn VideoStore>,
    retry: RetryPolicy,
    queue_retry: RetryConfig,
    /// How often an in-flight delivery's claim is refreshed
    heartbeat: Duration,
}

/// Task executor that processes deliveries from the queue.
pub struct JobExecutor {
    config: WorkerConfig,
    ctx: Arc<TaskContext>,
    task_semaphore: Arc<Semaphore>,
    shutdown: watch::Sender<bool>,
}

impl JobExecutor {
    /// Create a new executor. The queue must already be initialised.
    pub fn new(
        config: WorkerConfig,
        queue: Arc<dyn TaskConsumer>,
        pipeline: IngestPipeline,
        videos: Arc<dyn VideoStore>,
    ) -> Self {
        let task_semaphore = Arc::new(Semaphore::new(config.max_concurrent_tasks));
        let (shutdown, _) = watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        let ctx = Arc::new(TaskContext {
            consumer: consumer_name,
            queue,
            pipeline,
            videos,
            retry: config.retry.clone(),
            queue_retry: RetryConfig::new("queue_outcome"),
            heartbeat: (config.claim_min_idle / 2).max(MIN_LOOP_PERIOD),
        });

        Self {
            config,
            ctx,
            task_semaphore,
            shutdown,
        }
    }

    pub fn consumer_name(&self) -> &str {
        &self.ctx.consumer
    }

    /// Run until [`JobExecutor::shutdown`] is called, then drain in-flight tasks.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting executor '{}' with {} max concurrent tasks",
            self.ctx.consumer, self.config.max_concurrent_tasks
        );

        let claim_task = self.spawn_claim_loop();
        let promote_task = self.spawn_promote_loop();

        let mut shutdown_rx = self.shutdown.subscribe();
        let mut failures = FailureTracker::new(5);

        // Main consumption loop
        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume() => {
                    match result {
                        Ok(()) => failures.record_success(),
                        Err(e) => {
                            if failures.record_failure() {
                                error!("Error consuming tasks: {}", e);
                            }
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                    }
                }
            }
        }

        claim_task.await.ok();
        promote_task.await.ok();

        info!("Waiting for in-flight tasks to complete...");
        if tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_tasks())
            .await
            .is_err()
        {
            warn!(
                "Shutdown timeout elapsed with {} tasks still running",
                self.config.max_concurrent_tasks - self.task_semaphore.available_permits()
            );
        }

        info!("Executor stopped");
        Ok(())
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Fetch and dispatch one batch of deliveries.
    async fn consume(&self) -> WorkerResult<()> {
        let available = self.task_semaphore.available_permits();
        if available == 0 {
            // All slots busy, wait a bit
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let deliveries = self
            .ctx
            .queue
            .fetch(
                &self.ctx.consumer,
                available.min(self.config.fetch_batch),
                self.config.block,
            )
            .await?;

        if deliveries.is_empty() {
            return Ok(());
        }
        debug!("Fetched {} deliveries", deliveries.len());

        for delivery in deliveries {
            let permit = self
                .task_semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::config_error("Semaphore closed"))?;
            let ctx = Arc::clone(&self.ctx);

            tokio::spawn(async move {
                let _permit = permit;
                Self::execute(ctx, delivery).await;
            });
        }

        Ok(())
    }

    /// Periodically take over deliveries abandoned by crashed consumers.
    fn spawn_claim_loop(&self) -> JoinHandle<()> {
        let ctx = Arc::clone(&self.ctx);
        let semaphore = Arc::clone(&self.task_semaphore);
        let interval = self.config.claim_interval.max(MIN_LOOP_PERIOD);
        let min_idle = self.config.claim_min_idle;
        let mut shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            let mut failures = FailureTracker::new(3);
            loop {
                if *shutdown_rx.borrow() {
                    break;
                }
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        let available = semaphore.available_permits();
                        if available == 0 {
                            continue;
                        }
                        match ctx.queue.claim_stale(&ctx.consumer, min_idle, available.min(CLAIM_BATCH)).await {
                            Ok(deliveries) => {
                                failures.record_success();
                                for delivery in deliveries {
                                    let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                                        break;
                                    };
                                    let ctx = Arc::clone(&ctx);
                                    tokio::spawn(async move {
                                        let _permit = permit;
                                        Self::execute(ctx, delivery).await;
                                    });
                                }
                            }
                            Err(e) => {
                                if failures.record_failure() {
                                    warn!("Failed to claim stale deliveries: {}", e);
                                }
                            }
                        }
                    }
                }
            }
        })
    }

    /// Periodically move due retries back to the live stream and publish queue gauges.
    fn spawn_promote_loop(&self) -> JoinHandle<()> {
        let ctx = Arc::clone(&self.ctx);
        let interval = self.config.promote_interval.max(MIN_LOOP_PERIOD);
        let mut shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            let mut failures = FailureTracker::new(3);
            loop {
                if *shutdown_rx.borrow() {
                    break;
                }
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        let result: reel_queue::QueueResult<reel_queue::QueueDepth> = async {
                            ctx.queue.promote_due(PROMOTE_BATCH).await?;
                            ctx.queue.depth().await
                        }
                        .await;
                        match result {
                            Ok(depth) => {
                                failures.record_success();
                                metrics::set_queue_depth(depth);
                            }
                            Err(e) => {
                                if failures.record_failure() {
                                    warn!("Failed to promote due retries: {}", e);
                                }
                            }
                        }
                    }
                }
            }
        })
    }

    /// Process one delivery and settle it on the queue.
    async fn execute(ctx: Arc<TaskContext>, delivery: Delivery) {
        let outcome = Self::process_claimed(&ctx, &delivery).await;

        match outcome {
            TaskOutcome::Completed {
                video_id,
                already_done,
                ..
            } => {
                metrics::record_completed(already_done);
                Self::settle(&ctx, &delivery, "ack", |q, d| async move { q.ack(d).await }).await;
                debug!(
                    video_id = %video_id,
                    message_id = %delivery.message_id,
                    stage = Stage::Acknowledged.as_str(),
                    "Task acknowledged"
                );
            }
            TaskOutcome::Rejected { reason } => {
                metrics::record_rejected();
                warn!(message_id = %delivery.message_id, "Rejecting malformed task: {}", reason);
                let reason = reason.as_str();
                Self::settle(&ctx, &delivery, "reject", |q, d| async move {
                    q.reject(d, reason).await
                })
                .await;
            }
            TaskOutcome::Retry {
                video_id,
                stage,
                error,
            } => {
                let attempts_made = delivery.attempt.saturating_add(1);
                if ctx.retry.exhausted(attempts_made) {
                    let reason = format!(
                        "gave up after {} attempts at {}: {}",
                        attempts_made,
                        stage.as_str(),
                        error
                    );
                    Self::abandon(&ctx, &delivery, video_id, stage, &reason).await;
                } else {
                    let delay = ctx.retry.delay_for_attempt(delivery.attempt);
                    metrics::record_retried(stage.as_str());
                    info!(
                        video_id = %video_id,
                        message_id = %delivery.message_id,
                        attempt = attempts_made,
                        delay_ms = delay.as_millis() as u64,
                        "Task will be retried: {}", error
                    );
                    Self::settle(&ctx, &delivery, "retry_later", |q, d| async move {
                        q.retry_later(d, delay).await
                    })
                    .await;
                }
            }
            TaskOutcome::Abandoned {
                video_id,
                stage,
                reason,
            } => {
                Self::abandon(&ctx, &delivery, video_id, stage, &reason).await;
            }
        }
    }

    /// Run the pipeline, refreshing the delivery's claim every heartbeat so a
    /// long upload is never reclaimed by another consumer.
    async fn process_claimed(ctx: &TaskContext, delivery: &Delivery) -> TaskOutcome {
        let work = ctx.pipeline.process(delivery);
        tokio::pin!(work);

        let mut heartbeat =
            tokio::time::interval_at(Instant::now() + ctx.heartbeat, ctx.heartbeat);
        loop {
            tokio::select! {
                outcome = &mut work => return outcome,
                _ = heartbeat.tick() => {
                    if let Err(e) = ctx.queue.touch(&ctx.consumer, delivery).await {
                        warn!(
                            message_id = %delivery.message_id,
                            "Failed to refresh delivery claim: {}", e
                        );
                    }
                }
            }
        }
    }

    /// Fail the row, then dead-letter the task. Staged files are kept for replay.
    async fn abandon(
        ctx: &TaskContext,
        delivery: &Delivery,
        video_id: VideoId,
        stage: Stage,
        reason: &str,
    ) {
        metrics::record_dead_lettered(stage.as_str());
        error!(
            video_id = %video_id,
            message_id = %delivery.message_id,
            stage = stage.as_str(),
            "Dead-lettering task: {}", reason
        );

        match ctx.videos.mark_failed(video_id, reason).await {
            Ok(()) => {}
            Err(DbError::NotFound(_)) => debug!(video_id = %video_id, "No row to mark failed"),
            Err(e) => error!(video_id = %video_id, "Failed to mark video failed: {}", e),
        }

        Self::settle(ctx, delivery, "dead_letter", |q, d| async move {
            q.dead_letter(d, reason).await
        })
        .await;
    }

    /// Run a queue settlement with in-place retries. A settlement that still
    /// fails leaves the delivery pending, to be claimed again later.
    async fn settle<'a, F, Fut>(ctx: &'a TaskContext, delivery: &'a Delivery, op: &str, f: F)
    where
        F: Fn(&'a dyn TaskConsumer, &'a Delivery) -> Fut,
        Fut: std::future::Future<Output = reel_queue::QueueResult<()>>,
    {
        let queue: &'a dyn TaskConsumer = ctx.queue.as_ref();
        if let Err(e) = retry_async(&ctx.queue_retry, || f(queue, delivery)).await {
            error!(
                message_id = %delivery.message_id,
                "Failed to {} delivery: {}", op, e
            );
        }
    }

    /// Wait for all in-flight tasks to complete.
    async fn wait_for_tasks(&self) {
        loop {
            if self.task_semaphore.available_permits() == self.config.max_concurrent_tasks {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}
