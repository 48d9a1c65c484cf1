//! Dead-letter inspection tool.
//!
//! ```text
//! reel-dlq list [N]      print the N most recent dead letters (default 20)
//! reel-dlq replay <id>   move a dead letter back onto the live stream
//! ```

use anyhow::{bail, Context};

use reel_models::UploadTask;
use reel_queue::StreamQueue;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let queue = StreamQueue::from_env()
        .await
        .context("Failed to connect to queue")?;

    match args.first().map(String::as_str) {
        Some("list") => {
            let limit = match args.get(1) {
                Some(n) => n.parse().context("N must be a number")?,
                None => 20,
            };
            list(&queue, limit).await
        }
        Some("replay") => {
            let Some(id) = args.get(1) else {
                bail!("usage: reel-dlq replay <id>");
            };
            let message_id = queue.replay_dead_letter(id).await?;
            println!("replayed {} as {}", id, message_id);
            Ok(())
        }
        _ => bail!("usage: reel-dlq list [N] | reel-dlq replay <id>"),
    }
}

async fn list(queue: &StreamQueue, limit: usize) -> anyhow::Result<()> {
    let letters = queue.dead_letters(limit).await?;
    println!(
        "{} dead letters on {} (showing {})",
        queue.dlq_len().await?,
        queue.stream_name(),
        letters.len()
    );

    for letter in letters {
        let video = UploadTask::from_json(&letter.task)
            .map(|t| t.video_id.to_string())
            .unwrap_or_else(|_| "?".to_string());
        println!(
            "{}  video={}  attempts={}  original={}  error={}",
            letter.id, video, letter.attempt, letter.original_id, letter.error
        );
    }
    Ok(())
}
