//! Redis Streams task queue.
//!
//! This crate provides:
//! - Task publishing to a durable stream
//! - Consumer-group consumption with explicit acknowledgement
//! - Delayed retry via a sorted set and a dead-letter stream
//! - Crash recovery by claiming idle pending entries

pub mod config;
pub mod delivery;
pub mod error;
pub mod queue;

pub use config::QueueConfig;
pub use delivery::{Delivery, QueueDepth, TaskConsumer, TaskPublisher};
pub use error::{QueueError, QueueResult};
pub use queue::{DeadLetter, StreamQueue};
