//! In-memory collaborators for worker tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tempfile::TempDir;

use reel_db::{DbError, DbResult, VideoStore};
use reel_models::{NewVideo, UploadTask, VideoId, VideoRecord};
use reel_queue::{Delivery, QueueDepth, QueueError, QueueResult, TaskConsumer, TaskPublisher};
use reel_storage::{ObjectStore, StagingConfig, StorageError, StorageResult, TempStaging};
use reel_worker::{IngestPipeline, RetryPolicy, WorkerConfig};

pub const PUBLIC_BASE: &str = "http://objects.test";

/// Object store keeping uploads in memory, with failure injection.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    puts: AtomicUsize,
    unreachable: AtomicBool,
    failing_prefixes: Mutex<Vec<String>>,
    delay: Mutex<Duration>,
}

impl MemoryObjectStore {
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Make every upload take at least `delay`.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    /// Make every upload whose key starts with `prefix` fail.
    pub fn fail_prefix(&self, prefix: &str) {
        self.failing_prefixes
            .lock()
            .unwrap()
            .push(prefix.to_string());
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_file(&self, path: &Path, key: &str, _content_type: &str) -> StorageResult<String> {
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(StorageError::upload_failed("connection refused"));
        }
        if self
            .failing_prefixes
            .lock()
            .unwrap()
            .iter()
            .any(|p| key.starts_with(p.as_str()))
        {
            return Err(StorageError::upload_failed(format!("rejected {}", key)));
        }

        let bytes = tokio::fs::read(path).await?;
        self.objects.lock().unwrap().insert(key.to_string(), bytes);
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(self.public_url(key))
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", PUBLIC_BASE, key)
    }
}

/// Metadata store keeping rows in memory.
#[derive(Default)]
pub struct MemoryVideos {
    next_id: AtomicI64,
    rows: Mutex<HashMap<VideoId, VideoRecord>>,
    offline: AtomicBool,
    corrupt: AtomicBool,
}

impl MemoryVideos {
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn row(&self, id: VideoId) -> Option<VideoRecord> {
        self.rows.lock().unwrap().get(&id).cloned()
    }

    /// Make reads fail as if the stored row could not be decoded.
    pub fn set_corrupt(&self, corrupt: bool) {
        self.corrupt.store(corrupt, Ordering::SeqCst);
    }

    fn check_online(&self) -> DbResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(DbError::Sqlx(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

#[async_trait]
impl VideoStore for MemoryVideos {
    async fn create(&self, video: &NewVideo) -> DbResult<VideoId> {
        self.check_online()?;
        let id = VideoId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.rows
            .lock()
            .unwrap()
            .insert(id, VideoRecord::placeholder(id, video));
        Ok(id)
    }

    async fn get(&self, id: VideoId) -> DbResult<Option<VideoRecord>> {
        self.check_online()?;
        if self.corrupt.load(Ordering::SeqCst) {
            return Err(DbError::InvalidRow(format!(
                "video {} has unknown status 'archived'",
                id
            )));
        }
        Ok(self.row(id))
    }

    async fn update(&self, record: &VideoRecord) -> DbResult<()> {
        self.check_online()?;
        let mut rows = self.rows.lock().unwrap();
        match rows.get_mut(&record.id) {
            Some(row) => {
                *row = record.clone();
                Ok(())
            }
            None => Err(DbError::NotFound(record.id)),
        }
    }

    async fn mark_failed(&self, id: VideoId, reason: &str) -> DbResult<()> {
        self.check_online()?;
        let mut rows = self.rows.lock().unwrap();
        let row = rows.get_mut(&id).ok_or(DbError::NotFound(id))?;
        if !row.is_ready() {
            row.mark_failed(reason);
        }
        Ok(())
    }
}

/// Queue with consumer-group-like semantics kept in memory.
#[derive(Default)]
pub struct MemoryQueue {
    state: Mutex<QueueState>,
    next_id: AtomicUsize,
}

/// A delivered entry not yet settled.
struct PendingEntry {
    delivery: Delivery,
    consumer: String,
    idle_since: Instant,
    times_delivered: u32,
}

#[derive(Default)]
struct QueueState {
    live: VecDeque<Delivery>,
    pending: HashMap<String, PendingEntry>,
    retrying: Vec<(Instant, String, u32)>,
    published: Vec<UploadTask>,
    acked: Vec<Delivery>,
    rejected: Vec<Delivery>,
    retried: Vec<(Delivery, Duration)>,
    dead: Vec<(Delivery, String)>,
    claimed: Vec<(String, Delivery)>,
    touches: usize,
}

impl MemoryQueue {
    /// Append a raw payload to the live stream.
    pub fn push_raw(&self, body: &str, attempt: u32) -> String {
        let id = format!("{}-0", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.state.lock().unwrap().live.push_back(Delivery {
            message_id: id.clone(),
            body: body.to_string(),
            attempt,
        });
        id
    }

    pub fn published(&self) -> Vec<UploadTask> {
        self.state.lock().unwrap().published.clone()
    }

    pub fn acked(&self) -> Vec<Delivery> {
        self.state.lock().unwrap().acked.clone()
    }

    pub fn rejected(&self) -> Vec<Delivery> {
        self.state.lock().unwrap().rejected.clone()
    }

    pub fn retried(&self) -> Vec<(Delivery, Duration)> {
        self.state.lock().unwrap().retried.clone()
    }

    pub fn dead(&self) -> Vec<(Delivery, String)> {
        self.state.lock().unwrap().dead.clone()
    }

    /// Deliveries handed out by `claim_stale`, with the claiming consumer.
    pub fn claimed(&self) -> Vec<(String, Delivery)> {
        self.state.lock().unwrap().claimed.clone()
    }

    pub fn touches(&self) -> usize {
        self.state.lock().unwrap().touches
    }

    /// Nothing live, pending or waiting for retry.
    pub fn is_drained(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.live.is_empty() && state.pending.is_empty() && state.retrying.is_empty()
    }

    fn settle(&self, delivery: &Delivery) -> QueueResult<QueueStateGuard<'_>> {
        let mut state = self.state.lock().unwrap();
        if state.pending.remove(&delivery.message_id).is_none() {
            return Err(QueueError::NotFound(delivery.message_id.clone()));
        }
        Ok(QueueStateGuard(state))
    }
}

struct QueueStateGuard<'a>(std::sync::MutexGuard<'a, QueueState>);

#[async_trait]
impl TaskPublisher for MemoryQueue {
    async fn publish(&self, task: &UploadTask) -> QueueResult<String> {
        let body = task.to_json()?;
        self.state.lock().unwrap().published.push(task.clone());
        Ok(self.push_raw(&body, 0))
    }
}

#[async_trait]
impl TaskConsumer for MemoryQueue {
    async fn fetch(
        &self,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> QueueResult<Vec<Delivery>> {
        let deliveries: Vec<Delivery> = {
            let mut state = self.state.lock().unwrap();
            let n = count.min(state.live.len());
            let taken: Vec<Delivery> = state.live.drain(..n).collect();
            for d in &taken {
                state.pending.insert(
                    d.message_id.clone(),
                    PendingEntry {
                        delivery: d.clone(),
                        consumer: consumer.to_string(),
                        idle_since: Instant::now(),
                        times_delivered: 1,
                    },
                );
            }
            taken
        };
        if deliveries.is_empty() {
            tokio::time::sleep(block).await;
        }
        Ok(deliveries)
    }

    async fn claim_stale(
        &self,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let mut state = self.state.lock().unwrap();
        let now = Instant::now();
        let mut claimed = Vec::new();
        for entry in state.pending.values_mut() {
            if claimed.len() >= count {
                break;
            }
            if now.duration_since(entry.idle_since) < min_idle {
                continue;
            }
            // Every earlier delivery ended without an outcome.
            let delivery = Delivery {
                attempt: entry.delivery.attempt + entry.times_delivered,
                ..entry.delivery.clone()
            };
            entry.consumer = consumer.to_string();
            entry.idle_since = now;
            entry.times_delivered += 1;
            claimed.push(delivery);
        }
        for d in &claimed {
            state.claimed.push((consumer.to_string(), d.clone()));
        }
        Ok(claimed)
    }

    async fn touch(&self, consumer: &str, delivery: &Delivery) -> QueueResult<()> {
        let mut state = self.state.lock().unwrap();
        state.touches += 1;
        let entry = state
            .pending
            .get_mut(&delivery.message_id)
            .ok_or_else(|| QueueError::NotFound(delivery.message_id.clone()))?;
        entry.consumer = consumer.to_string();
        entry.idle_since = Instant::now();
        Ok(())
    }

    async fn ack(&self, delivery: &Delivery) -> QueueResult<()> {
        let mut guard = self.settle(delivery)?;
        guard.0.acked.push(delivery.clone());
        Ok(())
    }

    async fn reject(&self, delivery: &Delivery, _reason: &str) -> QueueResult<()> {
        let mut guard = self.settle(delivery)?;
        guard.0.rejected.push(delivery.clone());
        Ok(())
    }

    async fn retry_later(&self, delivery: &Delivery, delay: Duration) -> QueueResult<()> {
        let mut guard = self.settle(delivery)?;
        guard.0.retried.push((delivery.clone(), delay));
        guard.0.retrying.push((
            Instant::now() + delay,
            delivery.body.clone(),
            delivery.attempt + 1,
        ));
        Ok(())
    }

    async fn dead_letter(&self, delivery: &Delivery, error: &str) -> QueueResult<()> {
        let mut guard = self.settle(delivery)?;
        guard.0.dead.push((delivery.clone(), error.to_string()));
        Ok(())
    }

    async fn promote_due(&self, limit: usize) -> QueueResult<usize> {
        let due: Vec<(String, u32)> = {
            let mut state = self.state.lock().unwrap();
            let now = Instant::now();
            let mut due = Vec::new();
            state.retrying.retain(|(at, body, attempt)| {
                if *at <= now && due.len() < limit {
                    due.push((body.clone(), *attempt));
                    false
                } else {
                    true
                }
            });
            due
        };
        for (body, attempt) in &due {
            self.push_raw(body, *attempt);
        }
        Ok(due.len())
    }

    async fn depth(&self) -> QueueResult<QueueDepth> {
        let state = self.state.lock().unwrap();
        Ok(QueueDepth {
            live: state.live.len() as u64,
            retrying: state.retrying.len() as u64,
            dead: state.dead.len() as u64,
        })
    }
}

/// Shared fixtures for one test.
pub struct Fixture {
    pub tmp: TempDir,
    pub staging: TempStaging,
    pub store: Arc<MemoryObjectStore>,
    pub videos: Arc<MemoryVideos>,
    pub queue: Arc<MemoryQueue>,
}

impl Fixture {
    pub fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let staging = TempStaging::new(StagingConfig {
            dir: tmp.path().join("uploads"),
        });
        Self {
            tmp,
            staging,
            store: Arc::new(MemoryObjectStore::default()),
            videos: Arc::new(MemoryVideos::default()),
            queue: Arc::new(MemoryQueue::default()),
        }
    }

    pub fn pipeline(&self) -> IngestPipeline {
        IngestPipeline::new(self.store.clone(), self.videos.clone(), "image/jpeg")
    }

    /// Stage bytes, create the pending row and build the matching task.
    pub async fn staged_task(&self, bytes: &[u8], cover: Option<&[u8]>) -> UploadTask {
        let video_path = self.staging.stage(bytes, "mp4").await.unwrap();
        let cover_path = match cover {
            Some(c) => Some(self.staging.stage(c, "jpg").await.unwrap()),
            None => None,
        };
        let video_id = self
            .videos
            .create(&NewVideo::new(7, "clip.mp4"))
            .await
            .unwrap();

        UploadTask {
            video_id,
            video_path: video_path.display().to_string(),
            cover_path: cover_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            video_name: reel_storage::video_object_key(7, "mp4"),
            cover_name: if cover_path.is_some() {
                reel_storage::cover_object_key(7)
            } else {
                String::new()
            },
            content_type: "video/mp4".to_string(),
            user_id: 7,
            title: "clip.mp4".to_string(),
            description: String::new(),
        }
    }
}

pub fn delivery(task: &UploadTask, attempt: u32) -> Delivery {
    Delivery {
        message_id: format!("{}-{}", task.video_id, attempt),
        body: task.to_json().unwrap(),
        attempt,
    }
}

/// Worker config with no delays, suited to tests.
pub fn fast_config(max_attempts: u32) -> WorkerConfig {
    WorkerConfig {
        max_concurrent_tasks: 4,
        block: Duration::from_millis(10),
        retry: RetryPolicy::unbounded_immediate().with_max_attempts(max_attempts),
        claim_interval: Duration::from_secs(3600),
        promote_interval: Duration::from_millis(10),
        shutdown_timeout: Duration::from_secs(5),
        ..WorkerConfig::default()
    }
}

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn wait_until<F: Fn() -> bool>(timeout: Duration, condition: F) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
