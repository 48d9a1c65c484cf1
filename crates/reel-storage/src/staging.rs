//! Temp staging of uploaded bytes.
//!
//! Staged files live until the worker has durably stored them. Names are
//! random so concurrent uploads never collide.

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncRead;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::StorageResult;

/// Default staging directory, relative to the working directory.
pub const DEFAULT_STAGING_DIR: &str = "./tmp/uploads";

/// Staging configuration.
#[derive(Debug, Clone)]
pub struct StagingConfig {
    /// Directory staged files are written to
    pub dir: PathBuf,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_STAGING_DIR),
        }
    }
}

impl StagingConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            dir: std::env::var("UPLOAD_STAGING_DIR")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STAGING_DIR)),
        }
    }
}

/// Local staging area for uploads awaiting ingestion.
#[derive(Debug, Clone)]
pub struct TempStaging {
    dir: PathBuf,
}

impl TempStaging {
    pub fn new(config: StagingConfig) -> Self {
        Self { dir: config.dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `bytes` to a new uniquely named file and return its path.
    ///
    /// The file is synced to disk before returning.
    pub async fn stage(&self, bytes: &[u8], ext: &str) -> StorageResult<PathBuf> {
        let mut reader = bytes;
        self.stage_reader(&mut reader, ext).await
    }

    /// Stream `reader` into a new uniquely named file and return its path.
    ///
    /// On a failed write the partial file is removed before the error is returned.
    pub async fn stage_reader<R>(&self, reader: &mut R, ext: &str) -> StorageResult<PathBuf>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        fs::create_dir_all(&self.dir).await?;

        let ext = ext.trim().trim_start_matches('.');
        let name = if ext.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            format!("{}.{}", Uuid::new_v4(), ext)
        };
        let path = self.dir.join(name);

        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;

        match write_synced(file, reader).await {
            Ok(written) => {
                debug!(path = %path.display(), bytes = written, "Staged upload");
                Ok(path)
            }
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(&path).await {
                    warn!(path = %path.display(), "Failed to remove partial staged file: {}", cleanup);
                }
                Err(e.into())
            }
        }
    }

    /// Delete a staged file. A file that is already gone is not an error.
    pub async fn remove(&self, path: impl AsRef<Path>) -> StorageResult<()> {
        remove_staged(path).await
    }

    pub async fn exists(&self, path: impl AsRef<Path>) -> bool {
        fs::try_exists(path.as_ref()).await.unwrap_or(false)
    }
}

async fn write_synced<R>(mut file: fs::File, reader: &mut R) -> io::Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let written = tokio::io::copy(reader, &mut file).await?;
    file.sync_all().await?;
    Ok(written)
}

/// Delete a staged file by path. A file that is already gone is not an error.
pub async fn remove_staged(path: impl AsRef<Path>) -> StorageResult<()> {
    let path = path.as_ref();
    match fs::remove_file(path).await {
        Ok(()) => {
            debug!(path = %path.display(), "Removed staged file");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
