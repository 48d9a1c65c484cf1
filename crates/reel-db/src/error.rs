//! Metadata store error types.

use reel_models::VideoId;
use thiserror::Error;

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Video not found: {0}")]
    NotFound(VideoId),

    #[error("Invalid row: {0}")]
    InvalidRow(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

impl DbError {
    /// Returns true if the same operation may succeed when retried later.
    ///
    /// Connection-level failures are transient. A missing row, a row that
    /// cannot be decoded, bad configuration and failed migrations are not.
    pub fn is_transient(&self) -> bool {
        match self {
            DbError::Sqlx(e) => matches!(
                e,
                sqlx::Error::Io(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
                    | sqlx::Error::Tls(_)
            ),
            DbError::NotFound(_)
            | DbError::InvalidRow(_)
            | DbError::Config(_)
            | DbError::Migrate(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(DbError::Sqlx(sqlx::Error::PoolTimedOut).is_transient());
        assert!(DbError::Sqlx(sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset"
        )))
        .is_transient());
        assert!(!DbError::Sqlx(sqlx::Error::RowNotFound).is_transient());
        assert!(!DbError::NotFound(VideoId(1)).is_transient());
        assert!(!DbError::InvalidRow("status 'archived'".into()).is_transient());
        assert!(!DbError::Config("DATABASE_URL not set".into()).is_transient());
    }
}
