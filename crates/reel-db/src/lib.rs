//! Video metadata store.
//!
//! The ingestion pipeline only needs four operations on the metadata row;
//! they are captured by [`VideoStore`] so the publisher and worker can run
//! against any backend. [`PgVideoStore`] is the PostgreSQL implementation.

pub mod config;
pub mod error;
pub mod postgres;
pub mod store;

pub use config::DbConfig;
pub use error::{DbError, DbResult};
pub use postgres::PgVideoStore;
pub use store::VideoStore;
