//! PostgreSQL integration tests.

use reel_db::{DbConfig, DbError, PgVideoStore, VideoStore};
use reel_models::{IngestStatus, NewVideo, VideoId};

async fn store() -> PgVideoStore {
    dotenvy::dotenv().ok();
    let config = DbConfig::from_env().expect("DATABASE_URL not set");
    PgVideoStore::connect(&config).await.expect("Failed to connect")
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn test_placeholder_lifecycle() {
    let store = store().await;

    let id = store
        .create(&NewVideo::new(1, "clip.mp4").with_description("desc"))
        .await
        .expect("Failed to create");

    let mut record = store.get(id).await.unwrap().expect("row missing");
    assert_eq!(record.status, IngestStatus::Pending);
    assert!(record.play_url.is_none());
    assert_eq!(record.title, "clip.mp4");

    record.mark_ready("http://cdn/v.mp4", "http://cdn/c.jpg");
    store.update(&record).await.unwrap();
    store.update(&record).await.unwrap();

    let stored = store.get(id).await.unwrap().unwrap();
    assert!(stored.is_ready());
    assert_eq!(stored.play_url.as_deref(), Some("http://cdn/v.mp4"));

    // A ready row is never downgraded.
    store.mark_failed(id, "late failure").await.unwrap();
    assert!(store.get(id).await.unwrap().unwrap().is_ready());
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn test_mark_failed_records_reason() {
    let store = store().await;
    let id = store.create(&NewVideo::new(1, "x")).await.unwrap();

    store.mark_failed(id, "upload exhausted").await.unwrap();

    let record = store.get(id).await.unwrap().unwrap();
    assert_eq!(record.status, IngestStatus::Failed);
    assert_eq!(record.failure_reason.as_deref(), Some("upload exhausted"));
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn test_missing_row() {
    let store = store().await;
    let missing = VideoId(i64::MAX);

    assert!(store.get(missing).await.unwrap().is_none());
    assert!(matches!(
        store.mark_failed(missing, "x").await,
        Err(DbError::NotFound(_))
    ));
}
