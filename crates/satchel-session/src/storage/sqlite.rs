//! Durable session storage on SQLite.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, trace};

use super::SessionStorage;
use crate::error::{Error, Result};
use crate::record::{SessionData, SessionRecord, Timestamp};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS sessions (
    id          TEXT PRIMARY KEY NOT NULL,
    data        TEXT NOT NULL,
    created_at  INTEGER NOT NULL,
    accessed_at INTEGER NOT NULL,
    expired_at  INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_sessions_expired_at ON sessions (expired_at);
";

/// Session adapter backed by a single SQLite table.
///
/// Payloads cross the boundary as JSON text, so nothing read back can alias
/// a caller's data. Thread-safe via internal `Mutex<Connection>`.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Open (or create) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        debug!(path = %path.display(), "Opened SQLite session storage");
        Self::with_connection(conn)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<(SessionRecord, String)> {
    let record = SessionRecord {
        id: row.get(0)?,
        data: SessionData::new(),
        created_at: row.get(2)?,
        accessed_at: row.get(3)?,
        expired_at: row.get(4)?,
    };
    Ok((record, row.get(1)?))
}

/// Fetch the stored expiry for `id`, failing on absent or expired records.
fn check_live(conn: &Connection, id: &str, now: Timestamp) -> Result<()> {
    let expired_at: Option<Timestamp> = conn
        .query_row(
            "SELECT expired_at FROM sessions WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    match expired_at {
        None => Err(Error::NotFound(id.to_string())),
        Some(expired_at) if now > expired_at => Err(Error::Expired(id.to_string())),
        Some(_) => Ok(()),
    }
}

impl SessionStorage for SqliteStorage {
    fn exists(&self, id: &str) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .lock()
            .query_row("SELECT 1 FROM sessions WHERE id = ?1", params![id], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(found.is_some())
    }

    fn create(&self, record: &SessionRecord) -> Result<()> {
        let data = serde_json::to_string(&record.data)?;
        let inserted = self.conn.lock().execute(
            "INSERT OR IGNORE INTO sessions (id, data, created_at, accessed_at, expired_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.id,
                data,
                record.created_at,
                record.accessed_at,
                record.expired_at
            ],
        )?;
        if inserted == 0 {
            return Err(Error::DuplicateId(record.id.clone()));
        }
        trace!(session_id = %record.id, "Record created");
        Ok(())
    }

    fn update(&self, record: &SessionRecord, now: Timestamp) -> Result<()> {
        let data = serde_json::to_string(&record.data)?;
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        check_live(&tx, &record.id, now)?;
        tx.execute(
            "UPDATE sessions SET data = ?2, accessed_at = ?3, expired_at = ?4 WHERE id = ?1",
            params![record.id, data, record.accessed_at, record.expired_at],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn read(&self, id: &str, now: Timestamp) -> Result<SessionRecord> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT id, data, created_at, accessed_at, expired_at FROM sessions WHERE id = ?1",
                params![id],
                row_to_record,
            )
            .optional()?;
        let (mut record, data) = row.ok_or_else(|| Error::NotFound(id.to_string()))?;
        if record.is_expired_at(now) {
            return Err(Error::Expired(id.to_string()));
        }
        record.data = serde_json::from_str(&data)?;
        Ok(record)
    }

    fn touch(
        &self,
        id: &str,
        accessed_at: Timestamp,
        expired_at: Timestamp,
        now: Timestamp,
    ) -> Result<SessionRecord> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        check_live(&tx, id, now)?;
        tx.execute(
            "UPDATE sessions SET accessed_at = ?2, expired_at = ?3 WHERE id = ?1",
            params![id, accessed_at, expired_at],
        )?;
        let (mut record, data) = tx.query_row(
            "SELECT id, data, created_at, accessed_at, expired_at FROM sessions WHERE id = ?1",
            params![id],
            row_to_record,
        )?;
        tx.commit()?;
        record.data = serde_json::from_str(&data)?;
        Ok(record)
    }

    fn destroy(&self, id: &str) -> Result<bool> {
        let removed = self
            .conn
            .lock()
            .execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }

    fn flush(&self) -> Result<()> {
        self.conn.lock().execute("DELETE FROM sessions", [])?;
        Ok(())
    }

    fn clean(&self, now: Timestamp) -> Result<usize> {
        let removed = self
            .conn
            .lock()
            .execute("DELETE FROM sessions WHERE expired_at < ?1", params![now])?;
        Ok(removed)
    }

    fn len(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
