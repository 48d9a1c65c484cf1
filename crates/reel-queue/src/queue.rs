//! Task queue using Redis Streams.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::streams::{
    StreamClaimReply, StreamId, StreamPendingCountReply, StreamRangeReply, StreamReadReply,
};
use redis::Script;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use reel_models::UploadTask;

use crate::config::QueueConfig;
use crate::delivery::{Delivery, QueueDepth, TaskConsumer, TaskPublisher};
use crate::error::{QueueError, QueueResult};

const FIELD_TASK: &str = "task";
const FIELD_ATTEMPT: &str = "attempt";
const FIELD_ERROR: &str = "error";
const FIELD_ORIGINAL_ID: &str = "original_id";

/// Moves due members of the retry set (KEYS[1]) onto the live stream (KEYS[2]).
/// An entry is only re-added if this call removed it from the set.
const PROMOTE_SCRIPT: &str = r#"
local due = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, tonumber(ARGV[2]))
local moved = 0
for _, member in ipairs(due) do
    if redis.call('ZREM', KEYS[1], member) == 1 then
        local entry = cjson.decode(member)
        redis.call('XADD', KEYS[2], '*', 'task', entry.task, 'attempt', tostring(entry.attempt))
        moved = moved + 1
    end
end
return moved
"#;

/// Member of the retry set.
#[derive(Debug, Serialize, Deserialize)]
struct RetryEntry {
    /// Keeps members unique when the same payload is scheduled twice
    id: String,
    task: String,
    attempt: u32,
}

/// A task parked on the dead-letter stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    /// Entry id on the dead-letter stream
    pub id: String,
    /// Raw task payload
    pub task: String,
    /// Last failure
    pub error: String,
    /// Attempts made before giving up
    pub attempt: u32,
    /// Entry id the task had on the live stream
    pub original_id: String,
}

/// Redis Streams backed task queue.
#[derive(Clone)]
pub struct StreamQueue {
    client: redis::Client,
    conn: ConnectionManager,
    config: QueueConfig,
    stream: String,
    retry_key: String,
    dlq_stream: String,
    promote: Script,
}

impl StreamQueue {
    /// Connect to Redis.
    pub async fn connect(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())
            .map_err(|e| QueueError::connection_failed(e.to_string()))?;
        let conn = ConnectionManager::new(client.clone())
            .await
            .map_err(|e| QueueError::connection_failed(e.to_string()))?;

        Ok(Self {
            stream: config.stream_name(),
            retry_key: config.retry_key(),
            dlq_stream: config.dlq_stream_name(),
            promote: Script::new(PROMOTE_SCRIPT),
            client,
            conn,
            config,
        })
    }

    /// Connect using environment variables.
    pub async fn from_env() -> QueueResult<Self> {
        Self::connect(QueueConfig::from_env()).await
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn stream_name(&self) -> &str {
        &self.stream
    }

    /// Create the consumer group if it does not exist yet.
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.conn.clone();

        // Start from 0 so entries published before the first worker are not skipped.
        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.stream)
            .arg(&self.config.consumer_group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!("Created consumer group: {}", self.config.consumer_group),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group already exists: {}", self.config.consumer_group);
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        Ok(())
    }

    pub async fn ping(&self) -> QueueResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }

    /// Live stream length.
    pub async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.conn.clone();
        let len: u64 = redis::cmd("XLEN")
            .arg(&self.stream)
            .query_async(&mut conn)
            .await?;
        Ok(len)
    }

    /// Dead-letter stream length.
    pub async fn dlq_len(&self) -> QueueResult<u64> {
        let mut conn = self.conn.clone();
        let len: u64 = redis::cmd("XLEN")
            .arg(&self.dlq_stream)
            .query_async(&mut conn)
            .await?;
        Ok(len)
    }

    /// Most recent dead letters, newest first.
    pub async fn dead_letters(&self, limit: usize) -> QueueResult<Vec<DeadLetter>> {
        let mut conn = self.conn.clone();
        let reply: StreamRangeReply = redis::cmd("XREVRANGE")
            .arg(&self.dlq_stream)
            .arg("+")
            .arg("-")
            .arg("COUNT")
            .arg(limit)
            .query_async(&mut conn)
            .await?;

        Ok(reply.ids.iter().map(dead_letter_from_entry).collect())
    }

    /// Move a dead letter back onto the live stream with a fresh attempt count.
    /// Returns the new live stream entry id.
    pub async fn replay_dead_letter(&self, id: &str) -> QueueResult<String> {
        let mut conn = self.conn.clone();
        let reply: StreamRangeReply = redis::cmd("XRANGE")
            .arg(&self.dlq_stream)
            .arg(id)
            .arg(id)
            .query_async(&mut conn)
            .await?;

        let entry = reply
            .ids
            .first()
            .ok_or_else(|| QueueError::NotFound(id.to_string()))?;
        let task: String = entry
            .get(FIELD_TASK)
            .filter(|t: &String| !t.is_empty())
            .ok_or_else(|| QueueError::InvalidEntry {
                id: id.to_string(),
                reason: "missing task payload".to_string(),
            })?;

        let (message_id,): (String,) = redis::pipe()
            .atomic()
            .cmd("XADD")
            .arg(&self.stream)
            .arg("*")
            .arg(FIELD_TASK)
            .arg(&task)
            .arg(FIELD_ATTEMPT)
            .arg(0u32)
            .cmd("XDEL")
            .arg(&self.dlq_stream)
            .arg(id)
            .ignore()
            .query_async(&mut conn)
            .await?;

        info!(dead_letter = %id, message_id = %message_id, "Replayed dead letter");
        Ok(message_id)
    }

    async fn ack_entry(&self, message_id: &str) -> QueueResult<()> {
        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .cmd("XACK")
            .arg(&self.stream)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .ignore()
            .cmd("XDEL")
            .arg(&self.stream)
            .arg(message_id)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn delivery_from_entry(entry: &StreamId, extra_attempts: u32) -> Delivery {
    let attempt: u32 = entry.get(FIELD_ATTEMPT).unwrap_or(0);
    Delivery {
        message_id: entry.id.clone(),
        body: entry.get(FIELD_TASK).unwrap_or_default(),
        attempt: attempt.saturating_add(extra_attempts),
    }
}

fn dead_letter_from_entry(entry: &StreamId) -> DeadLetter {
    DeadLetter {
        id: entry.id.clone(),
        task: entry.get(FIELD_TASK).unwrap_or_default(),
        error: entry.get(FIELD_ERROR).unwrap_or_default(),
        attempt: entry.get(FIELD_ATTEMPT).unwrap_or(0),
        original_id: entry.get(FIELD_ORIGINAL_ID).unwrap_or_default(),
    }
}

#[async_trait]
impl TaskPublisher for StreamQueue {
    async fn publish(&self, task: &UploadTask) -> QueueResult<String> {
        let payload = task.to_json()?;
        let mut conn = self.conn.clone();

        let message_id: String = redis::cmd("XADD")
            .arg(&self.stream)
            .arg("*")
            .arg(FIELD_TASK)
            .arg(&payload)
            .arg(FIELD_ATTEMPT)
            .arg(0u32)
            .query_async(&mut conn)
            .await
            .map_err(|e| QueueError::publish_failed(e.to_string()))?;

        if self.config.min_replicas > 0 {
            let acked: u32 = redis::cmd("WAIT")
                .arg(self.config.min_replicas)
                .arg(self.config.wait_timeout.as_millis() as u64)
                .query_async(&mut conn)
                .await?;
            if acked < self.config.min_replicas {
                // Withdraw the entry; the caller treats the task as never published.
                if let Err(e) = redis::cmd("XDEL")
                    .arg(&self.stream)
                    .arg(&message_id)
                    .query_async::<u64>(&mut conn)
                    .await
                {
                    warn!(message_id = %message_id, "Failed to withdraw under-replicated entry: {}", e);
                }
                return Err(QueueError::Replication {
                    required: self.config.min_replicas,
                    acked,
                });
            }
        }

        info!(
            video_id = %task.video_id,
            message_id = %message_id,
            "Published upload task"
        );
        Ok(message_id)
    }
}

#[async_trait]
impl TaskConsumer for StreamQueue {
    async fn fetch(
        &self,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> QueueResult<Vec<Delivery>> {
        // Blocking reads get their own connection so they never stall the shared one.
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let reply: Option<StreamReadReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block.as_millis() as u64)
            .arg("STREAMS")
            .arg(&self.stream)
            .arg(">")
            .query_async(&mut conn)
            .await?;

        let deliveries: Vec<Delivery> = reply
            .unwrap_or_default()
            .keys
            .iter()
            .flat_map(|key| key.ids.iter())
            .map(|entry| delivery_from_entry(entry, 0))
            .collect();

        if !deliveries.is_empty() {
            debug!("Fetched {} deliveries from {}", deliveries.len(), self.stream);
        }
        Ok(deliveries)
    }

    async fn claim_stale(
        &self,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let mut conn = self.conn.clone();
        let min_idle_ms = min_idle.as_millis() as u64;

        let pending: StreamPendingCountReply = redis::cmd("XPENDING")
            .arg(&self.stream)
            .arg(&self.config.consumer_group)
            .arg("IDLE")
            .arg(min_idle_ms)
            .arg("-")
            .arg("+")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        if pending.ids.is_empty() {
            return Ok(Vec::new());
        }

        // Every earlier delivery of a stale entry ended without an outcome.
        let prior_deliveries: HashMap<&str, u32> = pending
            .ids
            .iter()
            .map(|p| (p.id.as_str(), p.times_delivered as u32))
            .collect();

        let mut cmd = redis::cmd("XCLAIM");
        cmd.arg(&self.stream)
            .arg(&self.config.consumer_group)
            .arg(consumer)
            .arg(min_idle_ms);
        for p in &pending.ids {
            cmd.arg(&p.id);
        }
        let claimed: StreamClaimReply = cmd.query_async(&mut conn).await?;

        let deliveries: Vec<Delivery> = claimed
            .ids
            .iter()
            .map(|entry| {
                let extra = prior_deliveries
                    .get(entry.id.as_str())
                    .copied()
                    .unwrap_or(1);
                delivery_from_entry(entry, extra)
            })
            .collect();

        if !deliveries.is_empty() {
            info!("Claimed {} stale deliveries for {}", deliveries.len(), consumer);
        }
        Ok(deliveries)
    }

    async fn touch(&self, consumer: &str, delivery: &Delivery) -> QueueResult<()> {
        let mut conn = self.conn.clone();
        // XCLAIM with zero min-idle resets the idle clock; JUSTID leaves the
        // delivery counter alone.
        let _: Vec<String> = redis::cmd("XCLAIM")
            .arg(&self.stream)
            .arg(&self.config.consumer_group)
            .arg(consumer)
            .arg(0u64)
            .arg(&delivery.message_id)
            .arg("JUSTID")
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn ack(&self, delivery: &Delivery) -> QueueResult<()> {
        self.ack_entry(&delivery.message_id).await?;
        debug!("Acknowledged delivery: {}", delivery.message_id);
        Ok(())
    }

    async fn reject(&self, delivery: &Delivery, reason: &str) -> QueueResult<()> {
        self.ack_entry(&delivery.message_id).await?;
        warn!(message_id = %delivery.message_id, "Discarded delivery: {}", reason);
        Ok(())
    }

    async fn retry_later(&self, delivery: &Delivery, delay: Duration) -> QueueResult<()> {
        let mut conn = self.conn.clone();
        let next_attempt = delivery.attempt.saturating_add(1);

        let mut pipe = redis::pipe();
        pipe.atomic();
        if delay.is_zero() {
            pipe.cmd("XADD")
                .arg(&self.stream)
                .arg("*")
                .arg(FIELD_TASK)
                .arg(&delivery.body)
                .arg(FIELD_ATTEMPT)
                .arg(next_attempt)
                .ignore();
        } else {
            let member = serde_json::to_string(&RetryEntry {
                id: Uuid::new_v4().to_string(),
                task: delivery.body.clone(),
                attempt: next_attempt,
            })?;
            let due_at = now_ms() + delay.as_millis() as i64;
            pipe.cmd("ZADD")
                .arg(&self.retry_key)
                .arg(due_at)
                .arg(member)
                .ignore();
        }
        pipe.cmd("XACK")
            .arg(&self.stream)
            .arg(&self.config.consumer_group)
            .arg(&delivery.message_id)
            .ignore()
            .cmd("XDEL")
            .arg(&self.stream)
            .arg(&delivery.message_id)
            .ignore();

        pipe.query_async::<()>(&mut conn).await?;

        debug!(
            message_id = %delivery.message_id,
            attempt = next_attempt,
            delay_ms = delay.as_millis() as u64,
            "Scheduled retry"
        );
        Ok(())
    }

    async fn dead_letter(&self, delivery: &Delivery, error: &str) -> QueueResult<()> {
        let mut conn = self.conn.clone();

        redis::pipe()
            .atomic()
            .cmd("XADD")
            .arg(&self.dlq_stream)
            .arg("*")
            .arg(FIELD_TASK)
            .arg(&delivery.body)
            .arg(FIELD_ERROR)
            .arg(error)
            .arg(FIELD_ATTEMPT)
            .arg(delivery.attempt)
            .arg(FIELD_ORIGINAL_ID)
            .arg(&delivery.message_id)
            .ignore()
            .cmd("XACK")
            .arg(&self.stream)
            .arg(&self.config.consumer_group)
            .arg(&delivery.message_id)
            .ignore()
            .cmd("XDEL")
            .arg(&self.stream)
            .arg(&delivery.message_id)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;

        warn!("Moved delivery {} to DLQ: {}", delivery.message_id, error);
        Ok(())
    }

    async fn promote_due(&self, limit: usize) -> QueueResult<usize> {
        let mut conn = self.conn.clone();
        let moved: usize = self
            .promote
            .key(&self.retry_key)
            .key(&self.stream)
            .arg(now_ms())
            .arg(limit)
            .invoke_async(&mut conn)
            .await?;

        if moved > 0 {
            debug!("Promoted {} due retries", moved);
        }
        Ok(moved)
    }

    async fn depth(&self) -> QueueResult<QueueDepth> {
        let mut conn = self.conn.clone();
        let (live, retrying, dead): (u64, u64, u64) = redis::pipe()
            .cmd("XLEN")
            .arg(&self.stream)
            .cmd("ZCARD")
            .arg(&self.retry_key)
            .cmd("XLEN")
            .arg(&self.dlq_stream)
            .query_async(&mut conn)
            .await?;

        Ok(QueueDepth {
            live,
            retrying,
            dead,
        })
    }
}
