//! Ingestion worker.
//!
//! This crate provides:
//! - The per-task ingestion state machine
//! - Task executor with bounded concurrency and graceful shutdown
//! - Retry policy with exponential backoff and dead-lettering
//! - Crash recovery of stale deliveries

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod retry;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use logging::TaskLogger;
pub use pipeline::{IngestPipeline, Stage, TaskOutcome};
pub use retry::{FailureTracker, RetryPolicy};
