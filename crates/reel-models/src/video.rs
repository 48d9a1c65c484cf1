//! Video metadata models.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of the user owning an upload.
pub type UserId = i64;

/// Identifier of a video metadata row, assigned by the metadata store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct VideoId(pub i64);

impl VideoId {
    /// Get the inner value.
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for VideoId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Ingestion status of a video.
///
/// URLs on a [`VideoRecord`] are only meaningful once the status is `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    /// Placeholder row exists, asset not yet durably stored
    #[default]
    Pending,
    /// Asset stored, URLs set
    Ready,
    /// Ingestion permanently abandoned
    Failed,
}

impl IngestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestStatus::Pending => "pending",
            IngestStatus::Ready => "ready",
            IngestStatus::Failed => "failed",
        }
    }

    /// Parse the storage representation. Unknown values map to `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(IngestStatus::Pending),
            "ready" => Some(IngestStatus::Ready),
            "failed" => Some(IngestStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for IngestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Insert shape for a placeholder row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct NewVideo {
    /// Owner of the video
    pub author_id: UserId,
    /// Video title
    pub title: String,
    /// Video description
    #[serde(default)]
    pub description: String,
}

impl NewVideo {
    pub fn new(author_id: UserId, title: impl Into<String>) -> Self {
        Self {
            author_id,
            title: title.into(),
            description: String::new(),
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Durable row representing one video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoRecord {
    /// Unique video ID
    pub id: VideoId,

    /// Owner of the video
    pub author_id: UserId,

    /// Public URL of the primary asset, set once ingestion completes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub play_url: Option<String>,

    /// Public URL of the cover (or the derived fallback)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,

    /// Ingestion status
    #[serde(default)]
    pub status: IngestStatus,

    /// Video title
    pub title: String,

    /// Video description
    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub favorite_count: i64,

    #[serde(default)]
    pub comment_count: i64,

    /// Reason recorded when ingestion was abandoned
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl VideoRecord {
    /// Build a pending record for a freshly assigned id.
    pub fn placeholder(id: VideoId, video: &NewVideo) -> Self {
        let now = Utc::now();
        Self {
            id,
            author_id: video.author_id,
            play_url: None,
            cover_url: None,
            status: IngestStatus::Pending,
            title: video.title.clone(),
            description: video.description.clone(),
            favorite_count: 0,
            comment_count: 0,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record the final asset URLs.
    ///
    /// Applying the same URLs twice leaves the record unchanged apart from
    /// `updated_at`.
    pub fn mark_ready(&mut self, play_url: impl Into<String>, cover_url: impl Into<String>) {
        self.play_url = Some(play_url.into());
        self.cover_url = Some(cover_url.into());
        self.status = IngestStatus::Ready;
        self.failure_reason = None;
        self.updated_at = Utc::now();
    }

    /// Mark ingestion as permanently failed. URLs are left untouched.
    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.status = IngestStatus::Failed;
        self.failure_reason = Some(reason.into());
        self.updated_at = Utc::now();
    }

    pub fn is_ready(&self) -> bool {
        self.status == IngestStatus::Ready
    }
}
