//! Database schema for the SQLite state backend

/// SQL statements to create all tables
pub const SCHEMA_SQL: &str = r#"
-- One row per partition with persisted progress
CREATE TABLE IF NOT EXISTS partition_state (
    partition TEXT PRIMARY KEY,
    cursor INTEGER NOT NULL DEFAULT 0,
    last_item_key TEXT NOT NULL DEFAULT '',
    processed_count INTEGER NOT NULL DEFAULT 0,
    last_update_time TEXT NOT NULL
);

-- Processed-set, one row per committed item
CREATE TABLE IF NOT EXISTS processed_items (
    partition TEXT NOT NULL,
    item_key TEXT NOT NULL,
    processed_at TEXT NOT NULL,
    PRIMARY KEY (partition, item_key)
);

CREATE INDEX IF NOT EXISTS idx_processed_partition ON processed_items(partition);
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
