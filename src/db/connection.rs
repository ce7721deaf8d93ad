//! SQLite connection setup and schema

use crate::error::{ArgoError, Result};
use rusqlite::Connection;
use std::path::Path;
use tracing::info;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS profiles (
    id TEXT PRIMARY KEY,
    lat REAL NOT NULL,
    lon REAL NOT NULL,
    time INTEGER NOT NULL,
    temperature TEXT NOT NULL,
    pressure TEXT NOT NULL,
    salinity TEXT NOT NULL DEFAULT '[]',
    metadata TEXT NOT NULL DEFAULT '{}',
    extra TEXT NOT NULL DEFAULT '{}',
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_profiles_time ON profiles(time);
CREATE INDEX IF NOT EXISTS idx_profiles_lat_lon ON profiles(lat, lon);
"#;

/// Open (or create) the profile database at `path`.
pub fn open_connection(path: impl AsRef<Path>) -> Result<Connection> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let conn = Connection::open(path)
        .map_err(|e| ArgoError::Store(format!("Failed to open database {}: {}", path.display(), e)))?;
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
        .map_err(|e| ArgoError::Store(format!("Failed to enable WAL: {}", e)))?;
    init_schema(&conn)?;

    info!("Profile database ready at {}", path.display());
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()
        .map_err(|e| ArgoError::Store(format!("Failed to open in-memory database: {}", e)))?;
    init_schema(&conn)?;
    Ok(conn)
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)
        .map_err(|e| ArgoError::Store(format!("Failed to create schema: {}", e)))
}
