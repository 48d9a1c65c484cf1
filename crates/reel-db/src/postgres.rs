//! PostgreSQL implementation of the metadata store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use std::time::Duration;
use tracing::info;

use reel_models::{IngestStatus, NewVideo, VideoId, VideoRecord};

use crate::config::DbConfig;
use crate::error::{DbError, DbResult};
use crate::store::VideoStore;

#[derive(Debug, FromRow)]
struct VideoRow {
    id: i64,
    author_id: i64,
    play_url: Option<String>,
    cover_url: Option<String>,
    status: String,
    title: String,
    description: String,
    favorite_count: i64,
    comment_count: i64,
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<VideoRow> for VideoRecord {
    type Error = DbError;

    fn try_from(row: VideoRow) -> Result<Self, Self::Error> {
        let status = IngestStatus::parse(&row.status).ok_or_else(|| {
            DbError::InvalidRow(format!("video {} has unknown status '{}'", row.id, row.status))
        })?;

        Ok(VideoRecord {
            id: VideoId(row.id),
            author_id: row.author_id,
            play_url: row.play_url,
            cover_url: row.cover_url,
            status,
            title: row.title,
            description: row.description,
            favorite_count: row.favorite_count,
            comment_count: row.comment_count,
            failure_reason: row.failure_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Video metadata repository backed by PostgreSQL.
#[derive(Clone)]
pub struct PgVideoStore {
    pool: PgPool,
}

impl PgVideoStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool and apply pending migrations.
    pub async fn connect(config: &DbConfig) -> DbResult<Self> {
        info!("Connecting to database...");
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .connect(&config.database_url)
            .await?;

        info!(
            max_connections = config.max_connections,
            "Database connected successfully"
        );

        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("Database migrations applied");

        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn exists(&self, id: VideoId) -> DbResult<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT id FROM videos WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }
}

#[async_trait]
impl VideoStore for PgVideoStore {
    #[tracing::instrument(skip(self, video), fields(db.table = "videos", db.operation = "insert", author_id = video.author_id))]
    async fn create(&self, video: &NewVideo) -> DbResult<VideoId> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO videos (author_id, title, description, status)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(video.author_id)
        .bind(&video.title)
        .bind(&video.description)
        .bind(IngestStatus::Pending.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(VideoId(id))
    }

    #[tracing::instrument(skip(self), fields(db.table = "videos", db.operation = "select", db.record_id = %id))]
    async fn get(&self, id: VideoId) -> DbResult<Option<VideoRecord>> {
        let row = sqlx::query_as::<_, VideoRow>(
            r#"
            SELECT id, author_id, play_url, cover_url, status, title, description,
                   favorite_count, comment_count, failure_reason, created_at, updated_at
            FROM videos
            WHERE id = $1
            "#,
        )
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await?;

        row.map(VideoRecord::try_from).transpose()
    }

    #[tracing::instrument(skip(self, record), fields(db.table = "videos", db.operation = "update", db.record_id = %record.id))]
    async fn update(&self, record: &VideoRecord) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE videos
            SET play_url = $2, cover_url = $3, status = $4, failure_reason = $5,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(record.id.get())
        .bind(&record.play_url)
        .bind(&record.cover_url)
        .bind(record.status.as_str())
        .bind(&record.failure_reason)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(record.id));
        }
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "videos", db.operation = "update", db.record_id = %id))]
    async fn mark_failed(&self, id: VideoId, reason: &str) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE videos
            SET status = $2, failure_reason = $3, updated_at = NOW()
            WHERE id = $1 AND status <> $4
            "#,
        )
        .bind(id.get())
        .bind(IngestStatus::Failed.as_str())
        .bind(reason)
        .bind(IngestStatus::Ready.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 && !self.exists(id).await? {
            return Err(DbError::NotFound(id));
        }
        Ok(())
    }
}
