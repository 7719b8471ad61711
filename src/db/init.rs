use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;

/// Open (and migrate) the database at the default location.
pub fn init_db() -> Result<Connection> {
    open(&crate::global::db_file()?)
}

/// Open (and migrate) a database at an explicit path. Controllers receive
/// the path at construction so tests can point at a scratch file.
pub fn open(db_path: &Path) -> Result<Connection> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }

    let conn = Connection::open(db_path).context("Failed to open database connection")?;

    migrate(&conn)?;

    Ok(conn)
}

pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS sessions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            platform TEXT NOT NULL,
            identifier TEXT,
            label TEXT,
            status TEXT NOT NULL DEFAULT 'initiating',
            outcome TEXT,
            audio_path TEXT,
            transcript_path TEXT,
            transcript_text TEXT,
            metadata_json TEXT,
            ever_confirmed_active INTEGER NOT NULL DEFAULT 0,
            started_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            ended_at TIMESTAMP,
            duration_seconds INTEGER,
            error TEXT,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )
    .context("Failed to create sessions table")?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_sessions_started_at ON sessions(started_at DESC)",
        [],
    )
    .context("Failed to create sessions started_at index")?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_sessions_platform ON sessions(platform)",
        [],
    )
    .context("Failed to create sessions platform index")?;

    Ok(())
}
