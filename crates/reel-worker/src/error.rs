//! Worker error types.

use thiserror::Error;

use reel_db::DbError;
use reel_models::VideoId;
use reel_storage::StorageError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Upload failed: {0}")]
    Upload(#[from] StorageError),

    #[error("Metadata update failed: {0}")]
    Metadata(#[from] DbError),

    #[error("Video {0} has no metadata row")]
    MissingVideo(VideoId),

    #[error("Staged file missing: {0}")]
    StagedFileMissing(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Queue error: {0}")]
    Queue(#[from] reel_queue::QueueError),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            // A staged file that vanished mid-upload is resolved by the next delivery.
            WorkerError::Upload(StorageError::NotFound(_)) => true,
            WorkerError::Upload(e) => e.is_transient(),
            WorkerError::Metadata(e) => e.is_transient(),
            WorkerError::Queue(_) => true,
            WorkerError::MissingVideo(_)
            | WorkerError::StagedFileMissing(_)
            | WorkerError::ConfigError(_) => false,
        }
    }
}
