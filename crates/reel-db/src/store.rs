//! Metadata store abstraction.

use async_trait::async_trait;

use reel_models::{NewVideo, VideoId, VideoRecord};

use crate::error::DbResult;

/// Persistent store of video metadata rows.
#[async_trait]
pub trait VideoStore: Send + Sync {
    /// Insert a pending placeholder row and return its id.
    async fn create(&self, video: &NewVideo) -> DbResult<VideoId>;

    async fn get(&self, id: VideoId) -> DbResult<Option<VideoRecord>>;

    /// Persist URLs, status and failure reason of an existing row.
    ///
    /// Fails with `DbError::NotFound` when the row does not exist.
    async fn update(&self, record: &VideoRecord) -> DbResult<()>;

    /// Mark ingestion as permanently failed. A row that is already ready is left alone.
    async fn mark_failed(&self, id: VideoId, reason: &str) -> DbResult<()>;
}
