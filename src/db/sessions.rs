//! Session record persistence.
//!
//! One row per join-to-cleanup cycle (or per answered call). Raw SQL with
//! rusqlite, no ORM.

use anyhow::{Context, Result};
use rusqlite::{params, Connection};

/// A session record from the database.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: i64,
    pub platform: String,
    pub identifier: Option<String>,
    pub label: Option<String>,
    pub status: String,
    pub outcome: Option<String>,
    pub audio_path: Option<String>,
    pub transcript_path: Option<String>,
    pub transcript_text: Option<String>,
    pub metadata_json: Option<String>,
    pub ever_confirmed_active: bool,
    pub started_at: String,
    pub ended_at: Option<String>,
    pub duration_seconds: Option<i64>,
    pub error: Option<String>,
}

const RECORD_COLUMNS: &str = "id, platform, identifier, label, status, outcome, audio_path, \
     transcript_path, transcript_text, metadata_json, ever_confirmed_active, \
     started_at, ended_at, duration_seconds, error";

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionRecord> {
    Ok(SessionRecord {
        id: row.get(0)?,
        platform: row.get(1)?,
        identifier: row.get(2)?,
        label: row.get(3)?,
        status: row.get(4)?,
        outcome: row.get(5)?,
        audio_path: row.get(6)?,
        transcript_path: row.get(7)?,
        transcript_text: row.get(8)?,
        metadata_json: row.get(9)?,
        ever_confirmed_active: row.get::<_, i64>(10)? != 0,
        started_at: row.get(11)?,
        ended_at: row.get(12)?,
        duration_seconds: row.get(13)?,
        error: row.get(14)?,
    })
}

/// Repository for session records.
pub struct SessionRepository;

impl SessionRepository {
    /// Insert a new session record. Returns the new session ID.
    pub fn insert(
        conn: &Connection,
        platform: &str,
        identifier: Option<&str>,
        label: Option<&str>,
    ) -> Result<i64> {
        conn.execute(
            "INSERT INTO sessions (platform, identifier, label) VALUES (?1, ?2, ?3)",
            params![platform, identifier, label],
        )
        .context("Failed to insert session")?;

        Ok(conn.last_insert_rowid())
    }

    /// Update the session status tag.
    pub fn set_status(conn: &Connection, id: i64, status: &str) -> Result<()> {
        conn.execute(
            "UPDATE sessions SET status = ?1 WHERE id = ?2",
            params![status, id],
        )
        .context("Failed to update session status")?;
        Ok(())
    }

    pub fn set_ever_confirmed_active(conn: &Connection, id: i64, value: bool) -> Result<()> {
        conn.execute(
            "UPDATE sessions SET ever_confirmed_active = ?1 WHERE id = ?2",
            params![value as i64, id],
        )
        .context("Failed to update session active flag")?;
        Ok(())
    }

    /// Close out a session with its outcome and artifacts.
    #[allow(clippy::too_many_arguments)]
    pub fn complete(
        conn: &Connection,
        id: i64,
        outcome: &str,
        audio_path: Option<&str>,
        transcript_path: Option<&str>,
        transcript_text: Option<&str>,
        metadata_json: Option<&str>,
        duration_seconds: i64,
    ) -> Result<()> {
        conn.execute(
            "UPDATE sessions SET status = 'terminated', outcome = ?1, audio_path = ?2, \
             transcript_path = ?3, transcript_text = ?4, metadata_json = ?5, \
             duration_seconds = ?6, ended_at = CURRENT_TIMESTAMP WHERE id = ?7",
            params![
                outcome,
                audio_path,
                transcript_path,
                transcript_text,
                metadata_json,
                duration_seconds,
                id,
            ],
        )
        .context("Failed to complete session")?;
        Ok(())
    }

    /// Mark a session as failed with an error.
    pub fn fail(conn: &Connection, id: i64, error: &str) -> Result<()> {
        conn.execute(
            "UPDATE sessions SET status = 'terminated', error = ?1, ended_at = CURRENT_TIMESTAMP \
             WHERE id = ?2",
            params![error, id],
        )
        .context("Failed to mark session as failed")?;
        Ok(())
    }

    /// Get a session by ID.
    pub fn get(conn: &Connection, id: i64) -> Result<Option<SessionRecord>> {
        let mut stmt = conn
            .prepare(&format!("SELECT {RECORD_COLUMNS} FROM sessions WHERE id = ?1"))
            .context("Failed to prepare session query")?;

        let mut rows = stmt
            .query_map(params![id], row_to_record)
            .context("Failed to query session")?;

        match rows.next() {
            Some(Ok(record)) => Ok(Some(record)),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }

    /// List sessions, newest first.
    pub fn list(conn: &Connection, limit: usize) -> Result<Vec<SessionRecord>> {
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {RECORD_COLUMNS} FROM sessions \
                 ORDER BY started_at DESC, id DESC LIMIT ?1"
            ))
            .context("Failed to prepare sessions list query")?;

        let rows = stmt
            .query_map(params![limit as i64], row_to_record)
            .context("Failed to list sessions")?;

        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(row?);
        }

        Ok(sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrate;

    fn setup_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        conn
    }

    #[test]
    fn test_insert_session() {
        let conn = setup_db();
        let id =
            SessionRepository::insert(&conn, "meet", Some("abc-defg-hij"), Some("standup")).unwrap();
        assert!(id > 0);
    }

    #[test]
    fn test_get_session() {
        let conn = setup_db();
        let id = SessionRepository::insert(&conn, "zoom", Some("1234567890"), None).unwrap();

        let record = SessionRepository::get(&conn, id).unwrap().unwrap();
        assert_eq!(record.id, id);
        assert_eq!(record.platform, "zoom");
        assert_eq!(record.identifier, Some("1234567890".to_string()));
        assert_eq!(record.status, "initiating");
        assert!(!record.ever_confirmed_active);
        assert!(record.ended_at.is_none());
    }

    #[test]
    fn test_get_nonexistent_session() {
        let conn = setup_db();
        assert!(SessionRepository::get(&conn, 9999).unwrap().is_none());
    }

    #[test]
    fn test_status_and_active_flag() {
        let conn = setup_db();
        let id = SessionRepository::insert(&conn, "meet", None, None).unwrap();

        SessionRepository::set_status(&conn, id, "monitoring").unwrap();
        SessionRepository::set_ever_confirmed_active(&conn, id, true).unwrap();

        let record = SessionRepository::get(&conn, id).unwrap().unwrap();
        assert_eq!(record.status, "monitoring");
        assert!(record.ever_confirmed_active);
    }

    #[test]
    fn test_complete_session() {
        let conn = setup_db();
        let id = SessionRepository::insert(&conn, "meet", Some("abc-defg-hij"), None).unwrap();

        SessionRepository::complete(
            &conn,
            id,
            "ended",
            Some("/tmp/session.wav"),
            Some("/tmp/session.txt"),
            Some("Hello transcript"),
            Some("{\"title\":\"Standup\"}"),
            1800,
        )
        .unwrap();

        let record = SessionRepository::get(&conn, id).unwrap().unwrap();
        assert_eq!(record.status, "terminated");
        assert_eq!(record.outcome, Some("ended".to_string()));
        assert_eq!(record.transcript_text, Some("Hello transcript".to_string()));
        assert_eq!(record.duration_seconds, Some(1800));
        assert!(record.ended_at.is_some());
    }

    #[test]
    fn test_complete_without_transcript() {
        let conn = setup_db();
        let id = SessionRepository::insert(&conn, "whatsapp", Some("+15551234567"), None).unwrap();

        SessionRepository::complete(&conn, id, "emptied_out", None, None, None, None, 900).unwrap();

        let record = SessionRepository::get(&conn, id).unwrap().unwrap();
        assert_eq!(record.outcome, Some("emptied_out".to_string()));
        assert!(record.transcript_text.is_none());
        assert!(record.audio_path.is_none());
    }

    #[test]
    fn test_fail_session() {
        let conn = setup_db();
        let id = SessionRepository::insert(&conn, "zoom", None, None).unwrap();

        SessionRepository::fail(&conn, id, "recording pipeline crashed").unwrap();

        let record = SessionRepository::get(&conn, id).unwrap().unwrap();
        assert_eq!(record.status, "terminated");
        assert_eq!(record.error, Some("recording pipeline crashed".to_string()));
        assert!(record.ended_at.is_some());
    }

    #[test]
    fn test_list_sessions() {
        let conn = setup_db();

        SessionRepository::insert(&conn, "meet", Some("aaa-bbbb-ccc"), None).unwrap();
        SessionRepository::insert(&conn, "zoom", Some("111"), None).unwrap();
        SessionRepository::insert(&conn, "whatsapp", Some("+1555"), None).unwrap();

        let sessions = SessionRepository::list(&conn, 2).unwrap();
        assert_eq!(sessions.len(), 2);
        // Newest first
        assert_eq!(sessions[0].platform, "whatsapp");
    }

    #[test]
    fn test_list_empty() {
        let conn = setup_db();
        assert!(SessionRepository::list(&conn, 10).unwrap().is_empty());
    }
}
