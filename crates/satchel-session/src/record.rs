//! The persisted session record.

use serde::{Deserialize, Serialize};

/// Logical time in whole seconds.
pub type Timestamp = i64;

/// Session payload: string keys to arbitrary JSON values.
pub type SessionData = serde_json::Map<String, serde_json::Value>;

/// The unit a storage adapter persists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Session identifier.
    pub id: String,

    /// Opaque payload.
    pub data: SessionData,

    /// Set once at creation.
    pub created_at: Timestamp,

    /// Last successful read or update.
    pub accessed_at: Timestamp,

    /// The record is expired once the clock passes this point.
    pub expired_at: Timestamp,
}

impl SessionRecord {
    /// Build a fresh, empty record created at `now` that lives for `lifetime_secs`.
    pub fn new(id: impl Into<String>, now: Timestamp, lifetime_secs: i64) -> Self {
        Self {
            id: id.into(),
            data: SessionData::new(),
            created_at: now,
            accessed_at: now,
            expired_at: now.saturating_add(lifetime_secs),
        }
    }

    /// Whether the record is expired at `now` (strictly past `expired_at`).
    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        now > self.expired_at
    }

    /// Whether [`clean`](crate::SessionStorage::clean) should remove the record at `now`.
    pub fn is_cleanable_at(&self, now: Timestamp) -> bool {
        self.expired_at < now
    }

    /// Slide the expiration window: mark accessed at `now`.
    pub fn touch(&mut self, now: Timestamp, lifetime_secs: i64) {
        self.accessed_at = now;
        self.expired_at = now.saturating_add(lifetime_secs);
    }
}
