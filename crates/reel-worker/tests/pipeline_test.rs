//! Ingestion pipeline tests against in-memory collaborators.

mod common;

use std::path::Path;

use common::{delivery, Fixture};
use reel_models::{fallback_cover_url, IngestStatus, VideoId};
use reel_queue::Delivery;
use reel_storage::ObjectStore;
use reel_worker::{Stage, TaskOutcome};

#[tokio::test]
async fn test_completes_and_cleans_up_staged_file() {
    let fx = Fixture::new();
    let task = fx.staged_task(b"frames", None).await;

    let outcome = fx.pipeline().process(&delivery(&task, 0)).await;

    let expected_url = fx.store.public_url(&task.video_name);
    match outcome {
        TaskOutcome::Completed {
            video_id,
            play_url,
            cover_url,
            already_done,
        } => {
            assert_eq!(video_id, task.video_id);
            assert_eq!(play_url, expected_url);
            assert_eq!(cover_url, fallback_cover_url(&expected_url));
            assert!(!already_done);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }

    let row = fx.videos.row(task.video_id).unwrap();
    assert_eq!(row.status, IngestStatus::Ready);
    assert_eq!(row.play_url.as_deref(), Some(expected_url.as_str()));
    assert_eq!(
        fx.store.object(&task.video_name).as_deref(),
        Some(&b"frames"[..])
    );
    assert!(!Path::new(&task.video_path).exists());
}

#[tokio::test]
async fn test_uploaded_cover_is_used() {
    let fx = Fixture::new();
    let task = fx.staged_task(b"frames", Some(b"jpeg")).await;

    let outcome = fx.pipeline().process(&delivery(&task, 0)).await;
    assert!(outcome.is_completed());

    let row = fx.videos.row(task.video_id).unwrap();
    assert_eq!(
        row.cover_url.as_deref(),
        Some(fx.store.public_url(&task.cover_name).as_str())
    );
    assert!(!Path::new(&task.video_path).exists());
    assert!(!Path::new(&task.cover_path).exists());
}

#[tokio::test]
async fn test_cover_failure_falls_back_to_snapshot() {
    let fx = Fixture::new();
    let task = fx.staged_task(b"frames", Some(b"jpeg")).await;
    fx.store.fail_prefix("covers/");

    let outcome = fx.pipeline().process(&delivery(&task, 0)).await;
    assert!(outcome.is_completed());

    let row = fx.videos.row(task.video_id).unwrap();
    let play_url = row.play_url.clone().unwrap();
    assert_eq!(row.status, IngestStatus::Ready);
    assert_eq!(row.cover_url, Some(fallback_cover_url(&play_url)));
    assert!(!Path::new(&task.video_path).exists());
}

#[tokio::test]
async fn test_redelivery_after_completion_is_a_no_op() {
    let fx = Fixture::new();
    let task = fx.staged_task(b"frames", None).await;
    let pipeline = fx.pipeline();

    assert!(pipeline.process(&delivery(&task, 0)).await.is_completed());
    let first = fx.videos.row(task.video_id).unwrap();
    let puts = fx.store.put_count();

    let outcome = pipeline.process(&delivery(&task, 1)).await;
    assert!(matches!(
        outcome,
        TaskOutcome::Completed {
            already_done: true,
            ..
        }
    ));

    let second = fx.videos.row(task.video_id).unwrap();
    assert_eq!(second.status, first.status);
    assert_eq!(second.play_url, first.play_url);
    assert_eq!(second.cover_url, first.cover_url);
    assert_eq!(fx.store.put_count(), puts);
}

#[tokio::test]
async fn test_unreachable_store_keeps_staged_file_for_retry() {
    let fx = Fixture::new();
    let task = fx.staged_task(b"frames", None).await;
    fx.store.set_unreachable(true);
    let pipeline = fx.pipeline();

    for attempt in 0..3 {
        let outcome = pipeline.process(&delivery(&task, attempt)).await;
        assert!(matches!(
            outcome,
            TaskOutcome::Retry {
                stage: Stage::UploadingPrimary,
                ..
            }
        ));
        assert!(Path::new(&task.video_path).exists());

        let row = fx.videos.row(task.video_id).unwrap();
        assert_eq!(row.status, IngestStatus::Pending);
        assert!(row.play_url.is_none());
    }

    fx.store.set_unreachable(false);
    assert!(pipeline.process(&delivery(&task, 3)).await.is_completed());
}

#[tokio::test]
async fn test_metadata_outage_is_retried() {
    let fx = Fixture::new();
    let task = fx.staged_task(b"frames", None).await;
    fx.videos.set_offline(true);

    let outcome = fx.pipeline().process(&delivery(&task, 0)).await;
    assert!(matches!(
        outcome,
        TaskOutcome::Retry {
            stage: Stage::MetadataUpdate,
            ..
        }
    ));
    assert!(Path::new(&task.video_path).exists());
}

#[tokio::test]
async fn test_malformed_envelope_is_rejected() {
    let fx = Fixture::new();
    let pipeline = fx.pipeline();

    for body in ["not json", "{}", r#"{"video_id":0,"video_path":"x","video_name":"y","user_id":1}"#] {
        let outcome = pipeline
            .process(&Delivery {
                message_id: "1-0".to_string(),
                body: body.to_string(),
                attempt: 0,
            })
            .await;
        assert!(
            matches!(outcome, TaskOutcome::Rejected { .. }),
            "body {:?} gave {:?}",
            body,
            outcome
        );
    }
    assert_eq!(fx.store.put_count(), 0);
}

#[tokio::test]
async fn test_missing_row_is_abandoned() {
    let fx = Fixture::new();
    let mut task = fx.staged_task(b"frames", None).await;
    task.video_id = VideoId(999);

    let outcome = fx.pipeline().process(&delivery(&task, 0)).await;
    assert!(matches!(
        outcome,
        TaskOutcome::Abandoned {
            stage: Stage::MetadataUpdate,
            ..
        }
    ));
    assert!(Path::new(&task.video_path).exists());
}

#[tokio::test]
async fn test_lost_staged_file_is_abandoned() {
    let fx = Fixture::new();
    let task = fx.staged_task(b"frames", None).await;
    std::fs::remove_file(&task.video_path).unwrap();

    let outcome = fx.pipeline().process(&delivery(&task, 0)).await;
    assert!(matches!(
        outcome,
        TaskOutcome::Abandoned {
            stage: Stage::Received,
            ..
        }
    ));
    assert_eq!(fx.store.put_count(), 0);
}

#[tokio::test]
async fn test_unreadable_staging_path_is_retried() {
    let fx = Fixture::new();
    let mut task = fx.staged_task(b"frames", None).await;
    // A path below a regular file fails with ENOTDIR rather than NotFound.
    task.video_path = format!("{}/frames.mp4", task.video_path);

    let outcome = fx.pipeline().process(&delivery(&task, 0)).await;
    assert!(matches!(
        outcome,
        TaskOutcome::Retry {
            stage: Stage::Received,
            ..
        }
    ));

    let row = fx.videos.row(task.video_id).unwrap();
    assert_eq!(row.status, IngestStatus::Pending);
    assert_eq!(fx.store.put_count(), 0);
}

#[tokio::test]
async fn test_undecodable_row_is_abandoned() {
    let fx = Fixture::new();
    let task = fx.staged_task(b"frames", None).await;
    fx.videos.set_corrupt(true);

    let outcome = fx.pipeline().process(&delivery(&task, 0)).await;
    assert!(matches!(
        outcome,
        TaskOutcome::Abandoned {
            stage: Stage::MetadataUpdate,
            ..
        }
    ));
    assert!(Path::new(&task.video_path).exists());
}
