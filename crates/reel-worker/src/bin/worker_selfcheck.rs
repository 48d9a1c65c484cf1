use std::path::Path;

use reel_queue::StreamQueue;
use reel_storage::{S3Client, StagingConfig};
use reel_worker::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = WorkerConfig::from_env();
    let staging = StagingConfig::from_env();

    println!(
        "worker-selfcheck: starting with staging_dir={} max_tasks={}",
        staging.dir.display(),
        config.max_concurrent_tasks
    );
    ensure_env_present(&[
        "REDIS_URL",
        "DATABASE_URL",
        "S3_ACCESS_KEY_ID",
        "S3_SECRET_ACCESS_KEY",
        "S3_BUCKET_NAME",
    ])?;
    ensure_staging_writable(&staging.dir).await?;
    ensure_redis().await?;
    ensure_bucket().await?;

    println!("worker-selfcheck: ok");
    Ok(())
}

async fn ensure_staging_writable<P: AsRef<Path>>(path: P) -> anyhow::Result<()> {
    let path = path.as_ref();
    tokio::fs::create_dir_all(path).await?;
    let marker = path.join(format!(".selfcheck-{}", uuid::Uuid::new_v4()));
    tokio::fs::write(&marker, b"ok")
        .await
        .map_err(|e| anyhow::anyhow!("staging dir {} not writable: {}", path.display(), e))?;
    tokio::fs::remove_file(&marker).await?;
    Ok(())
}

async fn ensure_redis() -> anyhow::Result<()> {
    let queue = StreamQueue::from_env().await?;
    queue
        .ping()
        .await
        .map_err(|e| anyhow::anyhow!("redis ping failed: {}", e))?;
    Ok(())
}

async fn ensure_bucket() -> anyhow::Result<()> {
    let storage = S3Client::from_env().await?;
    storage.check_connectivity().await?;
    Ok(())
}

fn ensure_env_present(vars: &[&str]) -> anyhow::Result<()> {
    for var in vars {
        if std::env::var(var).is_err() {
            return Err(anyhow::anyhow!("missing required env var {}", var));
        }
    }
    Ok(())
}
