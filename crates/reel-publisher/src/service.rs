//! The `enqueue_upload` entry point.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info, warn};
use validator::Validate;

use reel_db::VideoStore;
use reel_models::{NewVideo, UploadTask, VideoId};
use reel_queue::TaskPublisher;
use reel_storage::{cover_object_key, video_object_key, TempStaging, COVER_EXTENSION};

use crate::config::PublishConfig;
use crate::error::{PublishError, PublishResult};
use crate::metrics;
use crate::request::UploadRequest;

/// Accepts uploads and hands them to the ingestion worker.
pub struct PublishService {
    staging: TempStaging,
    videos: Arc<dyn VideoStore>,
    publisher: Arc<dyn TaskPublisher>,
    config: PublishConfig,
}

impl PublishService {
    pub fn new(
        config: PublishConfig,
        videos: Arc<dyn VideoStore>,
        publisher: Arc<dyn TaskPublisher>,
    ) -> Self {
        Self {
            staging: TempStaging::new(config.staging.clone()),
            videos,
            publisher,
            config,
        }
    }

    pub fn staging(&self) -> &TempStaging {
        &self.staging
    }

    /// Stage an upload, create its pending row and publish the ingestion task.
    ///
    /// Returns the id of the new video as soon as the task is on the queue.
    /// The row stays `Pending` until the worker has stored the asset.
    pub async fn enqueue_upload(&self, request: UploadRequest) -> PublishResult<VideoId> {
        let result = self.try_enqueue(request).await;
        if let Err(ref e) = result {
            metrics::record_publish_failure(e.stage());
        }
        result
    }

    async fn try_enqueue(&self, request: UploadRequest) -> PublishResult<VideoId> {
        request.validate()?;
        if request.bytes.len() > self.config.max_upload_bytes {
            return Err(PublishError::invalid(format!(
                "Upload is {} bytes, limit is {}",
                request.bytes.len(),
                self.config.max_upload_bytes
            )));
        }

        let staged = self.stage(&request).await?;

        let video = NewVideo::new(request.user_id, request.effective_title())
            .with_description(request.description.clone().unwrap_or_default());
        let video_id = match self.videos.create(&video).await {
            Ok(id) => id,
            Err(e) => {
                error!(user_id = request.user_id, "Failed to create placeholder: {}", e);
                self.discard(&staged).await;
                return Err(e.into());
            }
        };

        let task = UploadTask {
            video_id,
            video_path: staged.video.display().to_string(),
            cover_path: staged
                .cover
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            video_name: video_object_key(request.user_id, &request.extension()),
            cover_name: if staged.cover.is_some() {
                cover_object_key(request.user_id)
            } else {
                String::new()
            },
            content_type: request.effective_content_type(),
            user_id: request.user_id,
            title: video.title.clone(),
            description: video.description.clone(),
        };

        if let Err(e) = self.publisher.publish(&task).await {
            error!(video_id = %video_id, "Failed to publish upload task: {}", e);
            let reason = format!("publish failed: {}", e);
            if let Err(mark_err) = self.videos.mark_failed(video_id, &reason).await {
                warn!(video_id = %video_id, "Failed to mark video failed: {}", mark_err);
            }
            self.discard(&staged).await;
            return Err(PublishError::Queue {
                video_id,
                source: e,
            });
        }

        metrics::record_published(request.bytes.len());
        info!(
            video_id = %video_id,
            user_id = request.user_id,
            bytes = request.bytes.len(),
            has_cover = task.has_cover(),
            "Upload accepted"
        );
        Ok(video_id)
    }

    async fn stage(&self, request: &UploadRequest) -> PublishResult<StagedUpload> {
        let video = self.staging.stage(&request.bytes, &request.extension()).await?;

        let cover = match request.cover {
            Some(ref cover) => match self.staging.stage(&cover.bytes, COVER_EXTENSION).await {
                Ok(path) => Some(path),
                Err(e) => {
                    self.remove_quietly(&video).await;
                    return Err(e.into());
                }
            },
            None => None,
        };

        Ok(StagedUpload { video, cover })
    }

    async fn discard(&self, staged: &StagedUpload) {
        self.remove_quietly(&staged.video).await;
        if let Some(ref cover) = staged.cover {
            self.remove_quietly(cover).await;
        }
    }

    async fn remove_quietly(&self, path: &Path) {
        if let Err(e) = self.staging.remove(path).await {
            warn!(path = %path.display(), "Failed to remove staged file: {}", e);
        }
    }
}

struct StagedUpload {
    video: PathBuf,
    cover: Option<PathBuf>,
}
