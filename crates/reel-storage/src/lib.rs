//! Storage layer for the reel ingestion pipeline.
//!
//! This crate provides:
//! - Temp staging of uploaded bytes on local disk
//! - Collision-free object key generation
//! - The `ObjectStore` abstraction used by the worker
//! - An S3-compatible implementation of it

pub mod client;
pub mod error;
pub mod naming;
pub mod staging;
pub mod store;

pub use client::{S3Client, S3Config};
pub use error::{StorageError, StorageResult};
pub use naming::{cover_object_key, object_key, video_object_key, ObjectKind, COVER_EXTENSION};
pub use staging::{remove_staged, StagingConfig, TempStaging, DEFAULT_STAGING_DIR};
pub use store::ObjectStore;
