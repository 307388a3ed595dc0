//! Storage traits and error types
//!
//! This module defines the trait interface for key/value store backends and
//! associated error types.

use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Store already closed: {0}")]
    Closed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// A durable string-to-string map
///
/// Implementations must accept concurrent `put` calls from many tasks:
/// each call is its own write, with no cursor state shared between calls.
pub trait KvStore: Send + Sync {
    /// Gets the value stored under `key`
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value
    fn put(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Returns every entry ordered by key
    fn entries(&self) -> StorageResult<Vec<(String, String)>>;

    /// Flushes and closes the store
    ///
    /// Idempotent: closing an already-closed store succeeds.
    fn close(&self) -> StorageResult<()>;
}
