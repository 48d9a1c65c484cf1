//! Publish path of the ingestion pipeline.
//!
//! An upload is staged to local disk, a pending metadata row is created and
//! an [`reel_models::UploadTask`] is published for the worker. The caller
//! gets the video id back as soon as the task is on the queue.

pub mod config;
pub mod error;
pub mod metrics;
pub mod request;
pub mod service;

pub use config::PublishConfig;
pub use error::{PublishError, PublishResult};
pub use request::{CoverUpload, UploadRequest};
pub use service::PublishService;
