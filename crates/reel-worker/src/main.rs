//! Ingestion worker binary.

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use reel_db::{DbConfig, PgVideoStore};
use reel_queue::StreamQueue;
use reel_storage::S3Client;
use reel_worker::{metrics, IngestPipeline, JobExecutor, WorkerConfig};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS connections)
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider was already installed");
    }

    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    info!("Starting reel-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    if let Some(port) = config.metrics_port {
        match metrics::init_metrics(port) {
            Ok(()) => info!("Prometheus exporter listening on port {}", port),
            Err(e) => warn!("Failed to start Prometheus exporter: {}", e),
        }
    }

    let queue = match StreamQueue::from_env().await {
        Ok(q) => q,
        Err(e) => {
            error!("Failed to connect to queue: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = queue.init().await {
        error!("Failed to initialize queue: {}", e);
        std::process::exit(1);
    }

    let storage = match S3Client::from_env().await {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to create storage client: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = storage.ensure_bucket().await {
        error!("Failed to prepare bucket: {}", e);
        std::process::exit(1);
    }

    let videos = match DbConfig::from_env() {
        Ok(db_config) => match PgVideoStore::connect(&db_config).await {
            Ok(store) => Arc::new(store),
            Err(e) => {
                error!("Failed to connect to database: {}", e);
                std::process::exit(1);
            }
        },
        Err(e) => {
            error!("Invalid database configuration: {}", e);
            std::process::exit(1);
        }
    };

    let pipeline = IngestPipeline::new(
        Arc::new(storage),
        videos.clone(),
        config.cover_content_type.clone(),
    );
    let executor = Arc::new(JobExecutor::new(
        config,
        Arc::new(queue),
        pipeline,
        videos,
    ));

    // Setup signal handlers
    let signal_executor = Arc::clone(&executor);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Received shutdown signal");
        signal_executor.shutdown();
    });

    if let Err(e) = executor.run().await {
        error!("Executor error: {}", e);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
}

fn init_tracing() {
    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("reel=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
