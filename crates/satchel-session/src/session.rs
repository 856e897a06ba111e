//! Caller-held session handles.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::Result;
use crate::manager::SessionManager;
use crate::record::{SessionData, SessionRecord, Timestamp};

/// A local snapshot of one session record.
///
/// Mutations only touch the handle's own copy of the data; nothing reaches
/// storage until [`save`](Session::save). Two handles opened for the same id
/// never observe each other's unsaved changes.
///
/// Setting a key to `Value::Null` removes it, the same as [`unset`](Session::unset).
#[derive(Debug, Clone)]
pub struct Session {
    pub(crate) manager: SessionManager,
    pub(crate) record: SessionRecord,
    /// Whether the record has been written to storage at least once.
    pub(crate) persisted: bool,
    pub(crate) modified: bool,
}

impl Session {
    pub(crate) fn new(manager: SessionManager, record: SessionRecord, persisted: bool) -> Self {
        Self {
            manager,
            record,
            persisted,
            modified: false,
        }
    }

    /// Session identifier.
    pub fn id(&self) -> &str {
        &self.record.id
    }

    pub fn created_at(&self) -> Timestamp {
        self.record.created_at
    }

    pub fn accessed_at(&self) -> Timestamp {
        self.record.accessed_at
    }

    pub fn expired_at(&self) -> Timestamp {
        self.record.expired_at
    }

    /// Whether this snapshot is past its expiration by the manager's clock.
    pub fn is_expired(&self) -> bool {
        self.record.is_expired_at(self.manager.now())
    }

    /// Whether the data changed since it was last loaded or saved.
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Value at `key`, if set.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.record.data.get(key)
    }

    /// Value at `key`, or `default` if unset.
    pub fn get_or(&self, key: &str, default: impl Into<Value>) -> Value {
        self.get(key).cloned().unwrap_or_else(|| default.into())
    }

    /// Value at `key` deserialized into `T`; `None` if unset or of another shape.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// Set `key` to `value`. A null value removes the key.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        let key = key.into();
        match value.into() {
            Value::Null => {
                self.record.data.remove(&key);
            }
            value => {
                self.record.data.insert(key, value);
            }
        }
        self.modified = true;
        self
    }

    /// Set several keys at once, with the same null rule as [`set`](Session::set).
    pub fn extend<K, V, I>(&mut self, entries: I) -> &mut Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        for (key, value) in entries {
            self.set(key, value);
        }
        self
    }

    /// Remove `key`.
    pub fn unset(&mut self, key: &str) -> &mut Self {
        self.record.data.remove(key);
        self.modified = true;
        self
    }

    /// Whether `key` holds a value.
    pub fn is_set(&self, key: &str) -> bool {
        self.record.data.contains_key(key)
    }

    /// The handle's data.
    pub fn data(&self) -> &SessionData {
        &self.record.data
    }

    /// Mutable access to the handle's data. Marks the session modified.
    pub fn data_mut(&mut self) -> &mut SessionData {
        self.modified = true;
        &mut self.record.data
    }

    /// Replace the data wholesale. Null entries are dropped.
    pub fn set_data(&mut self, data: SessionData) -> &mut Self {
        self.record.data = data.into_iter().filter(|(_, v)| !v.is_null()).collect();
        self.modified = true;
        self
    }

    /// Persist the data and slide the expiration window.
    pub fn save(&mut self) -> Result<()> {
        let manager = self.manager.clone();
        manager.save(self)
    }

    /// Discard local changes and reload the stored record.
    pub fn reload(&mut self) -> Result<()> {
        let manager = self.manager.clone();
        manager.reload(self)
    }

    /// Remove the session from storage.
    ///
    /// Returns `true` if a stored record was removed.
    pub fn destroy(self) -> Result<bool> {
        if !self.persisted {
            return Ok(false);
        }
        self.manager.destroy(self.id())
    }
}

impl AsRef<str> for Session {
    fn as_ref(&self) -> &str {
        self.id()
    }
}
