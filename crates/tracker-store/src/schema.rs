//! Database schema.

use rusqlite::Connection;

use crate::error::Result;

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema.
pub fn initialize(conn: &Connection) -> Result<()> {
    let version = get_schema_version(conn)?;

    if version == 0 {
        create_schema_v1(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    }

    Ok(())
}

/// Get the current schema version.
fn get_schema_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='schema_version'",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version: i32 =
        conn.query_row("SELECT version FROM schema_version", [], |row| row.get(0))?;

    Ok(version)
}

/// Set the schema version.
fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?)",
        [version],
    )?;
    Ok(())
}

/// Create the initial schema (version 1).
fn create_schema_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            version INTEGER NOT NULL
        );

        -- One row per received fix; (device_key, timestamp) makes re-ingestion a no-op
        CREATE TABLE IF NOT EXISTS positions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            device_key TEXT NOT NULL,
            timestamp INTEGER NOT NULL,
            prev_latitude REAL,
            prev_longitude REAL,
            latitude REAL NOT NULL,
            longitude REAL NOT NULL,
            altitude REAL NOT NULL DEFAULT 0,
            speed REAL NOT NULL DEFAULT 0,
            heading REAL NOT NULL DEFAULT 0,
            distance_km REAL NOT NULL DEFAULT 0,
            track_tag TEXT NOT NULL,
            UNIQUE(device_key, timestamp)
        );
        CREATE INDEX IF NOT EXISTS idx_positions_tag_time
            ON positions(track_tag, timestamp);
        CREATE INDEX IF NOT EXISTS idx_positions_time
            ON positions(timestamp);

        -- Settled mileage of completed days, written once per tag
        CREATE TABLE IF NOT EXISTS stage_mileage (
            track_tag TEXT PRIMARY KEY,
            mileage REAL NOT NULL,
            settled_at INTEGER NOT NULL
        );

        -- Advisory locks shared by every handle on this database, times in unix milliseconds
        CREATE TABLE IF NOT EXISTS named_locks (
            name TEXT PRIMARY KEY,
            owner TEXT NOT NULL,
            acquired_at INTEGER NOT NULL,
            expires_at INTEGER NOT NULL
        );
        "#,
    )?;

    Ok(())
}
