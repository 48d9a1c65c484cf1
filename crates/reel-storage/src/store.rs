//! Durable object store abstraction.

use std::path::Path;

use async_trait::async_trait;

use crate::error::StorageResult;

/// Durable object storage reached by the ingestion worker.
///
/// Writing the same key twice overwrites the object, so uploads may be
/// repeated on redelivery.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload a local file under `key` and return its public URL.
    async fn put_file(&self, path: &Path, key: &str, content_type: &str) -> StorageResult<String>;

    /// Public URL an object stored under `key` is served from.
    fn public_url(&self, key: &str) -> String;
}
