//! Persistence behind a plain key/value interface.
//!
//! The aggregator only ever reads and writes three string values (see
//! [`cache`]). Any backend that can `get` and `set` text works; two ship
//! with the crate:
//!
//! - [`MemoryStore`] - process-local map, for tests and ephemeral embedding
//! - [`SqliteStore`] - single `kv` table in an SQLite file via `sqlx`

pub mod cache;
mod memory;
mod sqlite;

use std::future::Future;
use thiserror::Error;

pub use cache::Snapshot;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Persistence read/write failure. Never fatal: callers log it and keep
/// running on in-memory state.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Opaque text storage keyed by string.
pub trait KeyValueStore: Send + Sync + 'static {
    /// Value stored under `key`, or `None` if it was never set.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, StorageError>> + Send;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> impl Future<Output = Result<(), StorageError>> + Send;
}
