//! Publish path configuration.

use reel_storage::StagingConfig;

/// Largest upload accepted by default (100 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct PublishConfig {
    /// Largest accepted primary asset, in bytes
    pub max_upload_bytes: usize,
    pub staging: StagingConfig,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            staging: StagingConfig::default(),
        }
    }
}

impl PublishConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            max_upload_bytes: std::env::var("UPLOAD_MAX_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            staging: StagingConfig::from_env(),
        }
    }
}
