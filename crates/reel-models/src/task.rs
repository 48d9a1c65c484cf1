//! Upload task envelope carried on the ingestion queue.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::video::{UserId, VideoId};

/// Query suffix appended to a video URL to derive a cover from its first second.
pub const COVER_FALLBACK_SUFFIX: &str = "?x-oss-process=video/snapshot,t_1000,f_jpg";

/// Envelope could not be turned into a usable task. Never retryable.
#[derive(Debug, Error)]
pub enum TaskDecodeError {
    #[error("Malformed task payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Invalid task: {0}")]
    Invalid(String),
}

/// One unit of ingestion work.
///
/// The JSON shape of this struct is the queue contract; do not add fields
/// that consumers would require.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct UploadTask {
    /// Metadata row this upload belongs to
    pub video_id: VideoId,
    /// Staged local path of the primary asset
    pub video_path: String,
    /// Staged local path of the cover image (empty when absent)
    #[serde(default)]
    pub cover_path: String,
    /// Destination object key of the primary asset
    pub video_name: String,
    /// Destination object key of the cover
    #[serde(default)]
    pub cover_name: String,
    /// MIME type of the primary asset
    #[serde(default)]
    pub content_type: String,
    /// Uploading user
    pub user_id: UserId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

impl UploadTask {
    /// Decode a task from its queue payload and validate it.
    pub fn from_json(payload: &str) -> Result<Self, TaskDecodeError> {
        let task: UploadTask = serde_json::from_str(payload)?;
        task.validate()?;
        Ok(task)
    }

    /// Encode the task for the queue.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Reject envelopes that can never be processed successfully.
    pub fn validate(&self) -> Result<(), TaskDecodeError> {
        if self.video_id.get() <= 0 {
            return Err(TaskDecodeError::Invalid(format!(
                "video_id must be positive, got {}",
                self.video_id
            )));
        }
        if self.video_path.trim().is_empty() {
            return Err(TaskDecodeError::Invalid("video_path is empty".to_string()));
        }
        if self.video_name.trim().is_empty() {
            return Err(TaskDecodeError::Invalid("video_name is empty".to_string()));
        }
        if self.has_cover() && self.cover_name.trim().is_empty() {
            return Err(TaskDecodeError::Invalid(
                "cover_path set without cover_name".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns true if a cover image was staged alongside the video.
    pub fn has_cover(&self) -> bool {
        !self.cover_path.trim().is_empty()
    }

    /// Staged files referenced by this task.
    pub fn staged_paths(&self) -> Vec<&str> {
        let mut paths = vec![self.video_path.as_str()];
        if self.has_cover() {
            paths.push(self.cover_path.as_str());
        }
        paths
    }
}

/// Cover URL used when no cover was uploaded or its upload failed.
pub fn fallback_cover_url(video_url: &str) -> String {
    format!("{}{}", video_url, COVER_FALLBACK_SUFFIX)
}
