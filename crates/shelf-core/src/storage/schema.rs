//! SQLite schema for the durable item store
//!
//! One row per item, one column per [`crate::models::Field`]. The URL is
//! the primary key; the server-assigned guid is unique when present.

use rusqlite::{Connection, Result};

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Schema version tracking
        CREATE TABLE IF NOT EXISTS schema_info (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        -- Items table (timestamps are epoch milliseconds, booleans 0/1)
        CREATE TABLE IF NOT EXISTS items (
            guid TEXT UNIQUE,
            url TEXT PRIMARY KEY NOT NULL,
            title TEXT,
            resolved_url TEXT,
            resolved_title TEXT,
            excerpt TEXT,
            preview TEXT,
            status INTEGER NOT NULL DEFAULT 1,
            favorite INTEGER NOT NULL DEFAULT 0,
            is_article INTEGER NOT NULL DEFAULT 0,
            unread INTEGER NOT NULL DEFAULT 1,
            word_count INTEGER,
            read_position INTEGER,
            added_by TEXT,
            marked_read_by TEXT,
            added_on INTEGER,
            stored_on INTEGER,
            marked_read_on INTEGER
        );

        -- Indexes for common query patterns
        CREATE INDEX IF NOT EXISTS idx_items_added_on ON items(added_on);
        CREATE INDEX IF NOT EXISTS idx_items_unread ON items(unread);
        CREATE INDEX IF NOT EXISTS idx_items_status ON items(status);
        "#,
    )?;

    // Set schema version
    conn.execute(
        "INSERT OR REPLACE INTO schema_info (key, value) VALUES ('version', ?)",
        [SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> Result<Option<i32>> {
    let mut stmt = conn.prepare("SELECT value FROM schema_info WHERE key = 'version'")?;
    let result: Result<String> = stmt.query_row([], |row| row.get(0));

    match result {
        Ok(version_str) => Ok(version_str.parse().ok()),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Check if schema needs initialization or migration
pub fn needs_init(conn: &Connection) -> bool {
    let table_exists: bool = conn
        .prepare("SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_info'")
        .and_then(|mut stmt| stmt.exists([]))
        .unwrap_or(false);

    if !table_exists {
        return true;
    }

    match get_schema_version(conn) {
        Ok(Some(v)) => v < SCHEMA_VERSION,
        _ => true,
    }
}
