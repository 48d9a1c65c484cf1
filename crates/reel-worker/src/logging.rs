//! Structured task logging utilities.

use tracing::{error, info, warn, Span};

use reel_models::{UploadTask, VideoId};
use reel_queue::Delivery;

use crate::pipeline::Stage;

/// Logs task lifecycle events with the video id, message id and attempt attached.
#[derive(Debug, Clone)]
pub struct TaskLogger {
    video_id: VideoId,
    message_id: String,
    attempt: u32,
}

impl TaskLogger {
    pub fn new(task: &UploadTask, delivery: &Delivery) -> Self {
        Self {
            video_id: task.video_id,
            message_id: delivery.message_id.clone(),
            attempt: delivery.attempt,
        }
    }

    pub fn log_start(&self) {
        info!(
            video_id = %self.video_id,
            message_id = %self.message_id,
            attempt = self.attempt,
            "Task started"
        );
    }

    /// Log entry into a pipeline stage.
    pub fn log_stage(&self, stage: Stage) {
        info!(
            video_id = %self.video_id,
            message_id = %self.message_id,
            stage = stage.as_str(),
            "Task stage"
        );
    }

    pub fn log_warning(&self, stage: Stage, message: &str) {
        warn!(
            video_id = %self.video_id,
            message_id = %self.message_id,
            stage = stage.as_str(),
            "Task warning: {}", message
        );
    }

    pub fn log_error(&self, stage: Stage, message: &str) {
        error!(
            video_id = %self.video_id,
            message_id = %self.message_id,
            attempt = self.attempt,
            stage = stage.as_str(),
            "Task error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            video_id = %self.video_id,
            message_id = %self.message_id,
            attempt = self.attempt,
            "Task completed: {}", message
        );
    }

    pub fn video_id(&self) -> VideoId {
        self.video_id
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Create a tracing span for this task.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "ingest",
            video_id = %self.video_id,
            message_id = %self.message_id,
            attempt = self.attempt
        )
    }
}
