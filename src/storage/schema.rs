//! Database schema definitions
//!
//! Every store in a bundle is a single-table SQLite database holding a
//! string-to-string map. Readers of the bundle format open the table by
//! this exact name.

/// SQL schema for a key/value store
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS kv_table (
    key TEXT PRIMARY KEY,
    val TEXT
);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
