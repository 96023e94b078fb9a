//! Database schema definitions for the run ledger

/// Current schema version, stored in `PRAGMA user_version`
pub const SCHEMA_VERSION: u32 = 1;

/// SQL schema for the ledger database
pub const SCHEMA_SQL: &str = r#"
-- One row per harvest run
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    start_offset INTEGER NOT NULL,
    end_offset INTEGER,
    examined INTEGER NOT NULL DEFAULT 0,
    published INTEGER NOT NULL DEFAULT 0,
    resolution_misses INTEGER NOT NULL DEFAULT 0,
    fetch_failures INTEGER NOT NULL DEFAULT 0,
    recovered INTEGER NOT NULL DEFAULT 0,
    phase TEXT NOT NULL,
    error_message TEXT
);

-- Documents whose text could not be fetched, kept for later runs
CREATE TABLE IF NOT EXISTS deferred_documents (
    identifier TEXT PRIMARY KEY,
    reference TEXT,
    record_offset INTEGER,
    attempts INTEGER NOT NULL DEFAULT 1,
    last_error TEXT NOT NULL,
    first_failed_at TEXT NOT NULL,
    last_failed_at TEXT NOT NULL,
    recovered_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_deferred_pending
    ON deferred_documents(recovered_at, attempts);
"#;

/// Creates all tables and stamps the schema version
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    Ok(())
}

/// Reads the schema version stamped on an open database
pub fn schema_version(conn: &rusqlite::Connection) -> Result<u32, rusqlite::Error> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
}
