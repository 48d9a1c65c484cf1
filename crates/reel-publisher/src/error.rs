//! Publish path errors.

use thiserror::Error;

use reel_db::DbError;
use reel_models::VideoId;
use reel_queue::QueueError;
use reel_storage::StorageError;

pub type PublishResult<T> = Result<T, PublishError>;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Invalid upload: {0}")]
    InvalidRequest(String),

    #[error("Failed to stage upload: {0}")]
    Staging(#[from] StorageError),

    #[error("Failed to create video metadata: {0}")]
    Metadata(#[from] DbError),

    /// The placeholder row exists but was marked failed.
    #[error("Failed to publish task for video {video_id}: {source}")]
    Queue {
        video_id: VideoId,
        #[source]
        source: QueueError,
    },
}

impl PublishError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Stage label used in logs and metrics.
    pub fn stage(&self) -> &'static str {
        match self {
            PublishError::InvalidRequest(_) => "validate",
            PublishError::Staging(_) => "staging",
            PublishError::Metadata(_) => "metadata",
            PublishError::Queue { .. } => "queue",
        }
    }
}

impl From<validator::ValidationErrors> for PublishError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::InvalidRequest(errors.to_string())
    }
}
