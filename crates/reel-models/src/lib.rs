//! Shared data models for the reel ingestion pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - The upload task envelope carried on the queue
//! - Video metadata records and their ingestion status

pub mod task;
pub mod video;

// Re-export common types
pub use task::{fallback_cover_url, TaskDecodeError, UploadTask, COVER_FALLBACK_SUFFIX};
pub use video::{IngestStatus, NewVideo, UserId, VideoId, VideoRecord};
