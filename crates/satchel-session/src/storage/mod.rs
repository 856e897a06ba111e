//! Storage adapters for session records.
//!
//! This module defines the [`SessionStorage`] trait that decouples the
//! [`SessionManager`](crate::SessionManager) from a specific persistence
//! medium.
//!
//! # Architecture
//!
//! ```text
//! SessionStorage (trait)   - Adapter contract consumed by the manager
//!     └── MemoryStorage    - In-process table (reference adapter)
//!     └── SqliteStorage    - Durable SQLite table
//! ```
//!
//! Adapters never read a clock of their own. Every time-dependent call
//! receives `now` from the manager, which acts as the time authority.

mod memory;
mod sqlite;

pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::record::{SessionRecord, Timestamp};

/// Contract every session storage adapter honors.
///
/// Each call must be atomic with respect to the adapter's own storage.
/// Records are handed in and out by value: an adapter must never let a
/// caller alias the state it holds.
///
/// # Thread Safety
///
/// All implementations must be `Send + Sync` to allow sharing across threads.
pub trait SessionStorage: Send + Sync {
    /// Whether a record is held for `id`, expired or not.
    fn exists(&self, id: &str) -> Result<bool>;

    /// Insert a new record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateId`] if a record with the same id is held.
    fn create(&self, record: &SessionRecord) -> Result<()>;

    /// Replace the data and access timestamps of an existing record.
    ///
    /// Expiration is checked against the *stored* record before anything is
    /// written. `created_at` is never overwritten.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if absent, [`Error::Expired`] if the stored
    /// record is past its `expired_at` at `now`.
    fn update(&self, record: &SessionRecord, now: Timestamp) -> Result<()>;

    /// Load a copy of the record for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] or [`Error::Expired`] as for `update`.
    fn read(&self, id: &str, now: Timestamp) -> Result<SessionRecord>;

    /// Move the access window of a live record and return a copy of it.
    ///
    /// Only `accessed_at` and `expired_at` are written, so a data write that
    /// lands between two calls is never rolled back. The expiry check, the
    /// write and the copy happen as one atomic step.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] or [`Error::Expired`] as for `update`.
    fn touch(
        &self,
        id: &str,
        accessed_at: Timestamp,
        expired_at: Timestamp,
        now: Timestamp,
    ) -> Result<SessionRecord>;

    /// Remove the record for `id`.
    ///
    /// Returns `true` if something was removed. Absent ids are not an error.
    fn destroy(&self, id: &str) -> Result<bool>;

    /// Remove every record.
    fn flush(&self) -> Result<()> {
        Err(Error::NotImplemented("flush"))
    }

    /// Remove every record whose `expired_at` is strictly before `now`.
    ///
    /// Returns the number of records removed.
    fn clean(&self, _now: Timestamp) -> Result<usize> {
        Err(Error::NotImplemented("clean"))
    }

    /// Number of records held, expired or not.
    fn len(&self) -> Result<usize> {
        Err(Error::NotImplemented("len"))
    }

    /// Whether no records are held.
    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl<S: SessionStorage + ?Sized> SessionStorage for Arc<S> {
    fn exists(&self, id: &str) -> Result<bool> {
        (**self).exists(id)
    }

    fn create(&self, record: &SessionRecord) -> Result<()> {
        (**self).create(record)
    }

    fn update(&self, record: &SessionRecord, now: Timestamp) -> Result<()> {
        (**self).update(record, now)
    }

    fn read(&self, id: &str, now: Timestamp) -> Result<SessionRecord> {
        (**self).read(id, now)
    }

    fn touch(
        &self,
        id: &str,
        accessed_at: Timestamp,
        expired_at: Timestamp,
        now: Timestamp,
    ) -> Result<SessionRecord> {
        (**self).touch(id, accessed_at, expired_at, now)
    }

    fn destroy(&self, id: &str) -> Result<bool> {
        (**self).destroy(id)
    }

    fn flush(&self) -> Result<()> {
        (**self).flush()
    }

    fn clean(&self, now: Timestamp) -> Result<usize> {
        (**self).clean(now)
    }

    fn len(&self) -> Result<usize> {
        (**self).len()
    }
}

/// Storage shared between a manager and its callers.
pub type SharedStorage = Arc<dyn SessionStorage>;

#[cfg(test)]
mod tests {
    use super::*;

    /// Adapter that only implements the required operations.
    struct PartialStorage;

    impl SessionStorage for PartialStorage {
        fn exists(&self, _id: &str) -> Result<bool> {
            Ok(false)
        }

        fn create(&self, _record: &SessionRecord) -> Result<()> {
            Ok(())
        }

        fn update(&self, record: &SessionRecord, _now: Timestamp) -> Result<()> {
            Err(Error::NotFound(record.id.clone()))
        }

        fn read(&self, id: &str, _now: Timestamp) -> Result<SessionRecord> {
            Err(Error::NotFound(id.to_string()))
        }

        fn touch(
            &self,
            id: &str,
            _accessed_at: Timestamp,
            _expired_at: Timestamp,
            _now: Timestamp,
        ) -> Result<SessionRecord> {
            Err(Error::NotFound(id.to_string()))
        }

        fn destroy(&self, _id: &str) -> Result<bool> {
            Ok(false)
        }
    }

    #[test]
    fn test_missing_operations_report_not_implemented() {
        let storage = PartialStorage;
        assert!(matches!(storage.flush(), Err(Error::NotImplemented("flush"))));
        assert!(matches!(storage.clean(0), Err(Error::NotImplemented("clean"))));
        assert!(matches!(storage.len(), Err(Error::NotImplemented("len"))));
        assert!(matches!(storage.is_empty(), Err(Error::NotImplemented("len"))));
    }

    #[test]
    fn test_arc_forwards_to_inner() {
        let storage: SharedStorage = Arc::new(MemoryStorage::new());
        let wrapped = Arc::clone(&storage);

        wrapped.create(&SessionRecord::new("abc", 0, 10)).unwrap();
        assert!(storage.exists("abc").unwrap());
        assert_eq!(wrapped.len().unwrap(), 1);

        let touched = wrapped.touch("abc", 4, 14, 4).unwrap();
        assert_eq!(touched.expired_at, 14);
        assert_eq!(storage.read("abc", 4).unwrap().expired_at, 14);
    }
}
