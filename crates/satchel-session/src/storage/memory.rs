//! In-process session storage.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::trace;

use super::SessionStorage;
use crate::error::{Error, Result};
use crate::record::{SessionRecord, Timestamp};

/// Reference adapter keeping records in a mutex-guarded map.
///
/// Records are cloned on the way in and out. `serde_json` values own their
/// contents, so a clone is a deep copy and no handle can alias the table.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    sessions: Mutex<HashMap<String, SessionRecord>>,
}

impl MemoryStorage {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }
}

/// Look up a live record, distinguishing "absent" from "expired".
fn live<'a>(
    sessions: &'a mut HashMap<String, SessionRecord>,
    id: &str,
    now: Timestamp,
) -> Result<&'a mut SessionRecord> {
    let stored = sessions
        .get_mut(id)
        .ok_or_else(|| Error::NotFound(id.to_string()))?;
    if stored.is_expired_at(now) {
        return Err(Error::Expired(id.to_string()));
    }
    Ok(stored)
}

impl SessionStorage for MemoryStorage {
    fn exists(&self, id: &str) -> Result<bool> {
        Ok(self.sessions.lock().contains_key(id))
    }

    fn create(&self, record: &SessionRecord) -> Result<()> {
        let mut sessions = self.sessions.lock();
        if sessions.contains_key(&record.id) {
            return Err(Error::DuplicateId(record.id.clone()));
        }
        sessions.insert(record.id.clone(), record.clone());
        trace!(session_id = %record.id, size = sessions.len(), "Record created");
        Ok(())
    }

    fn update(&self, record: &SessionRecord, now: Timestamp) -> Result<()> {
        let mut sessions = self.sessions.lock();
        let stored = live(&mut sessions, &record.id, now)?;
        stored.data = record.data.clone();
        stored.accessed_at = record.accessed_at;
        stored.expired_at = record.expired_at;
        Ok(())
    }

    fn read(&self, id: &str, now: Timestamp) -> Result<SessionRecord> {
        let mut sessions = self.sessions.lock();
        live(&mut sessions, id, now).map(|stored| stored.clone())
    }

    fn touch(
        &self,
        id: &str,
        accessed_at: Timestamp,
        expired_at: Timestamp,
        now: Timestamp,
    ) -> Result<SessionRecord> {
        let mut sessions = self.sessions.lock();
        let stored = live(&mut sessions, id, now)?;
        stored.accessed_at = accessed_at;
        stored.expired_at = expired_at;
        Ok(stored.clone())
    }

    fn destroy(&self, id: &str) -> Result<bool> {
        Ok(self.sessions.lock().remove(id).is_some())
    }

    fn flush(&self) -> Result<()> {
        self.sessions.lock().clear();
        Ok(())
    }

    fn clean(&self, now: Timestamp) -> Result<usize> {
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|_, record| !record.is_cleanable_at(now));
        Ok(before - sessions.len())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.sessions.lock().len())
    }
}
