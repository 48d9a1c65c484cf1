//! Per-task ingestion state machine.
//!
//! `Received -> UploadingPrimary -> UploadingCover -> MetadataUpdate -> Cleanup`.
//! The pipeline never talks to the queue; it returns a [`TaskOutcome`] and
//! the executor turns that into ack, retry or dead-letter.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::Instrument;

use reel_db::VideoStore;
use reel_models::{fallback_cover_url, UploadTask, VideoId};
use reel_queue::Delivery;
use reel_storage::{remove_staged, ObjectStore, StorageError};

use crate::error::WorkerError;
use crate::logging::TaskLogger;
use crate::metrics;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Processing stage of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    UploadingPrimary,
    UploadingCover,
    MetadataUpdate,
    Cleanup,
    Acknowledged,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Received => "received",
            Stage::UploadingPrimary => "uploading_primary",
            Stage::UploadingCover => "uploading_cover",
            Stage::MetadataUpdate => "metadata_update",
            Stage::Cleanup => "cleanup",
            Stage::Acknowledged => "acknowledged",
        }
    }
}

/// Result of processing one delivery.
#[derive(Debug)]
pub enum TaskOutcome {
    /// The row is ready. `already_done` is set when an earlier delivery did the work.
    Completed {
        video_id: VideoId,
        play_url: String,
        cover_url: String,
        already_done: bool,
    },
    /// The envelope can never be processed; discard it.
    Rejected { reason: String },
    /// A retryable failure; the staged files are untouched.
    Retry {
        video_id: VideoId,
        stage: Stage,
        error: WorkerError,
    },
    /// The task can never succeed; dead-letter it and fail the row.
    Abandoned {
        video_id: VideoId,
        stage: Stage,
        reason: String,
    },
}

impl TaskOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, TaskOutcome::Completed { .. })
    }

    fn from_error(video_id: VideoId, stage: Stage, error: WorkerError) -> Self {
        if error.is_retryable() {
            TaskOutcome::Retry {
                video_id,
                stage,
                error,
            }
        } else {
            TaskOutcome::Abandoned {
                video_id,
                stage,
                reason: error.to_string(),
            }
        }
    }
}

/// Moves one staged upload into durable storage and reconciles its row.
pub struct IngestPipeline {
    store: Arc<dyn ObjectStore>,
    videos: Arc<dyn VideoStore>,
    cover_content_type: String,
}

impl IngestPipeline {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        videos: Arc<dyn VideoStore>,
        cover_content_type: impl Into<String>,
    ) -> Self {
        Self {
            store,
            videos,
            cover_content_type: cover_content_type.into(),
        }
    }

    /// Process one delivery to an outcome. Never touches the queue.
    pub async fn process(&self, delivery: &Delivery) -> TaskOutcome {
        let task = match UploadTask::from_json(&delivery.body) {
            Ok(task) => task,
            Err(e) => {
                return TaskOutcome::Rejected {
                    reason: e.to_string(),
                }
            }
        };

        let logger = TaskLogger::new(&task, delivery);
        let span = logger.create_span();
        self.run(&task, &logger).instrument(span).await
    }

    async fn run(&self, task: &UploadTask, logger: &TaskLogger) -> TaskOutcome {
        let video_id = task.video_id;
        logger.log_start();

        match tokio::fs::try_exists(&task.video_path).await {
            Ok(true) => {}
            Ok(false) => return self.resolve_missing_staged_file(task, logger).await,
            Err(e) => {
                let error = WorkerError::Upload(StorageError::Io(e));
                logger.log_error(Stage::Received, &error.to_string());
                return TaskOutcome::from_error(video_id, Stage::Received, error);
            }
        }

        logger.log_stage(Stage::UploadingPrimary);
        let content_type = if task.content_type.trim().is_empty() {
            DEFAULT_CONTENT_TYPE
        } else {
            task.content_type.as_str()
        };
        let play_url = match self
            .upload("video", &task.video_path, &task.video_name, content_type)
            .await
        {
            Ok(url) => url,
            Err(e) => {
                logger.log_error(Stage::UploadingPrimary, &e.to_string());
                return TaskOutcome::from_error(video_id, Stage::UploadingPrimary, e);
            }
        };

        let cover_url = self.upload_cover(task, &play_url, logger).await;

        logger.log_stage(Stage::MetadataUpdate);
        if let Err(e) = self.mark_ready(video_id, &play_url, &cover_url).await {
            logger.log_error(Stage::MetadataUpdate, &e.to_string());
            return TaskOutcome::from_error(video_id, Stage::MetadataUpdate, e);
        }

        logger.log_stage(Stage::Cleanup);
        cleanup(task, logger).await;

        logger.log_completion(&play_url);
        TaskOutcome::Completed {
            video_id,
            play_url,
            cover_url,
            already_done: false,
        }
    }

    /// Cover failures are never fatal; the cover falls back to a frame of the video.
    async fn upload_cover(&self, task: &UploadTask, play_url: &str, logger: &TaskLogger) -> String {
        if !task.has_cover() {
            metrics::record_cover_fallback("absent");
            return fallback_cover_url(play_url);
        }

        logger.log_stage(Stage::UploadingCover);
        match self
            .upload(
                "cover",
                &task.cover_path,
                &task.cover_name,
                &self.cover_content_type,
            )
            .await
        {
            Ok(url) => url,
            Err(e) => {
                logger.log_warning(
                    Stage::UploadingCover,
                    &format!("cover upload failed, using video snapshot: {}", e),
                );
                metrics::record_cover_fallback("upload_failed");
                fallback_cover_url(play_url)
            }
        }
    }

    async fn upload(
        &self,
        kind: &'static str,
        path: &str,
        key: &str,
        content_type: &str,
    ) -> Result<String, WorkerError> {
        let started = Instant::now();
        let result = self.store.put_file(Path::new(path), key, content_type).await;
        metrics::record_upload(kind, result.is_ok(), started.elapsed().as_secs_f64());
        Ok(result?)
    }

    async fn mark_ready(
        &self,
        video_id: VideoId,
        play_url: &str,
        cover_url: &str,
    ) -> Result<(), WorkerError> {
        let mut record = self
            .videos
            .get(video_id)
            .await?
            .ok_or(WorkerError::MissingVideo(video_id))?;
        record.mark_ready(play_url, cover_url);
        self.videos.update(&record).await?;
        Ok(())
    }

    /// The staged primary is gone: either a previous delivery finished and its
    /// ack was lost, or the file was lost and the task can never succeed.
    async fn resolve_missing_staged_file(
        &self,
        task: &UploadTask,
        logger: &TaskLogger,
    ) -> TaskOutcome {
        let video_id = task.video_id;
        match self.videos.get(video_id).await {
            Ok(Some(record)) if record.is_ready() => {
                cleanup(task, logger).await;
                logger.log_completion("already ingested by an earlier delivery");
                TaskOutcome::Completed {
                    video_id,
                    play_url: record.play_url.unwrap_or_default(),
                    cover_url: record.cover_url.unwrap_or_default(),
                    already_done: true,
                }
            }
            Ok(Some(_)) => {
                let error = WorkerError::StagedFileMissing(task.video_path.clone());
                logger.log_error(Stage::Received, &error.to_string());
                TaskOutcome::from_error(video_id, Stage::Received, error)
            }
            Ok(None) => TaskOutcome::from_error(
                video_id,
                Stage::Received,
                WorkerError::MissingVideo(video_id),
            ),
            Err(e) => TaskOutcome::from_error(video_id, Stage::Received, e.into()),
        }
    }
}

/// Best-effort removal of every staged file of the task.
async fn cleanup(task: &UploadTask, logger: &TaskLogger) {
    for path in task.staged_paths() {
        if let Err(e) = remove_staged(path).await {
            metrics::record_cleanup_failure();
            logger.log_warning(
                Stage::Cleanup,
                &format!("failed to remove staged file {}: {}", path, e),
            );
        }
    }
}
