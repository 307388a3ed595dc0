//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the KvStore trait.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{KvStore, StorageError, StorageResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// SQLite key/value store backend
pub struct SqliteKv {
    path: PathBuf,
    conn: Mutex<Option<Connection>>,
}

impl SqliteKv {
    /// Opens (creating if needed) a store at the given path
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteKv)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        // The file is archived as-is, so no WAL sidecar files
        conn.execute_batch(
            "
            PRAGMA journal_mode = DELETE;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            path: path.to_path_buf(),
            conn: Mutex::new(Some(conn)),
        })
    }

    /// Creates an in-memory store (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn: Mutex::new(Some(conn)),
        })
    }

    /// Path of the backing database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Option<Connection>>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Database("connection mutex poisoned".to_string()))
    }

    fn closed(&self) -> StorageError {
        StorageError::Closed(self.path.display().to_string())
    }
}

impl KvStore for SqliteKv {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let guard = self.lock()?;
        let conn = guard.as_ref().ok_or_else(|| self.closed())?;
        let value = conn
            .query_row(
                "SELECT val FROM kv_table WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn put(&self, key: &str, value: &str) -> StorageResult<()> {
        let guard = self.lock()?;
        let conn = guard.as_ref().ok_or_else(|| self.closed())?;
        conn.execute(
            "INSERT OR REPLACE INTO kv_table (key, val) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    fn entries(&self) -> StorageResult<Vec<(String, String)>> {
        let guard = self.lock()?;
        let conn = guard.as_ref().ok_or_else(|| self.closed())?;
        let mut stmt = conn.prepare("SELECT key, val FROM kv_table ORDER BY key")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn close(&self) -> StorageResult<()> {
        let mut guard = self.lock()?;
        match guard.take() {
            Some(conn) => conn.close().map_err(|(_, e)| StorageError::Sqlite(e)),
            None => Ok(()),
        }
    }
}
