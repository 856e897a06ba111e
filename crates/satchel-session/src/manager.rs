//! Session lifecycle orchestration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::clock::{Clock, SharedClock, SystemClock};
use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::id::IdGenerator;
use crate::record::{SessionRecord, Timestamp};
use crate::session::Session;
use crate::storage::{MemoryStorage, SessionStorage, SharedStorage};

struct ManagerInner {
    lifetime_secs: i64,
    ids: IdGenerator,
    creation_attempts: u32,
    storage: SharedStorage,
    clock: SharedClock,
}

/// Creates, opens and expires sessions over a [`SessionStorage`] adapter.
///
/// The manager is the only component that talks to storage and the only
/// time authority: every adapter call that depends on time receives `now`
/// from the manager's [`Clock`]. Expiration slides on every successful
/// open or save.
///
/// Cloning is cheap and clones share the same storage and clock.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<ManagerInner>,
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("lifetime_secs", &self.inner.lifetime_secs)
            .field("session_id_length", &self.inner.ids.length())
            .field("creation_attempts", &self.inner.creation_attempts)
            .field("clock", &self.inner.clock)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Build a manager from configuration, using the wall clock.
    pub fn new(config: SessionConfig) -> Result<Self> {
        Self::builder().config(config).build()
    }

    /// A manager with default settings over a fresh [`MemoryStorage`].
    pub fn in_memory() -> Self {
        Self::from_parts(
            &SessionConfig::default(),
            Arc::new(MemoryStorage::new()),
            Arc::new(SystemClock),
        )
    }

    /// Start building a manager.
    pub fn builder() -> SessionManagerBuilder {
        SessionManagerBuilder::default()
    }

    fn from_parts(config: &SessionConfig, storage: SharedStorage, clock: SharedClock) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                lifetime_secs: config.lifetime_secs as i64,
                ids: IdGenerator::new(config.session_id_length),
                creation_attempts: config.creation_attempts,
                storage,
                clock,
            }),
        }
    }

    /// Configured session lifetime, added to the access time on every open and save.
    pub fn lifetime(&self) -> Duration {
        Duration::from_secs(self.inner.lifetime_secs as u64)
    }

    /// Current time according to the manager's clock.
    pub fn now(&self) -> Timestamp {
        self.inner.clock.now()
    }

    /// The time source shared with every handle this manager hands out.
    pub fn clock(&self) -> &SharedClock {
        &self.inner.clock
    }

    /// The adapter holding the records. Calls on it bypass expiry sliding.
    pub fn storage(&self) -> &SharedStorage {
        &self.inner.storage
    }

    /// Generate an identifier without reserving it.
    pub fn generate_id(&self) -> String {
        self.inner.ids.generate()
    }

    /// Whether storage holds a record for `id` (expired or not).
    pub fn exists(&self, id: &str) -> Result<bool> {
        self.inner.storage.exists(id)
    }

    /// Number of records held by storage.
    pub fn len(&self) -> Result<usize> {
        self.inner.storage.len()
    }

    /// Whether storage holds no records.
    pub fn is_empty(&self) -> Result<bool> {
        self.inner.storage.is_empty()
    }

    /// Create and persist a new, empty session under a fresh identifier.
    ///
    /// Identifier collisions reported by storage are retried with a new
    /// identifier, up to the configured attempt bound.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Creation`] when every attempt collided. Any other
    /// storage error is returned immediately.
    pub fn create(&self) -> Result<Session> {
        let attempts = self.inner.creation_attempts;
        let mut session = Session::new(
            self.clone(),
            SessionRecord::new(String::new(), self.now(), self.inner.lifetime_secs),
            false,
        );

        for attempt in 1..=attempts {
            session.record.id = self.generate_id();
            match self.save(&mut session) {
                Ok(()) => {
                    debug!(
                        session_id = %session.id(),
                        expired_at = session.expired_at(),
                        "Session created"
                    );
                    return Ok(session);
                }
                Err(Error::DuplicateId(id)) => {
                    debug!(session_id = %id, attempt, "Session id collision, retrying");
                }
                Err(e) => return Err(e),
            }
        }

        warn!(attempts, "Giving up on session creation");
        Err(Error::Creation { attempts })
    }

    /// Open an existing session and slide its expiration window.
    ///
    /// The refresh is a single [`SessionStorage::touch`] that writes only the
    /// timestamps, so a save from another handle is never overwritten.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no record is held and
    /// [`Error::Expired`] if the record is past its expiration, even when
    /// [`clean`](Self::clean) has not removed it yet.
    pub fn open(&self, id: &str) -> Result<Session> {
        let now = self.now();
        let expired_at = now.saturating_add(self.inner.lifetime_secs);
        let record = self.inner.storage.touch(id, now, expired_at, now)?;

        trace!(session_id = %id, expired_at = record.expired_at, "Session opened");
        Ok(Session::new(self.clone(), record, true))
    }

    /// Alias for [`open`](Self::open).
    pub fn read(&self, id: &str) -> Result<Session> {
        self.open(id)
    }

    /// Write a handle's data back to storage and slide its expiration.
    ///
    /// A handle that has never been stored is created instead.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Expired`] if the record expired since it was opened
    /// and [`Error::NotFound`] if it was destroyed in the meantime. The
    /// handle is left unchanged on error.
    pub fn save(&self, session: &mut Session) -> Result<()> {
        let now = self.now();
        let mut record = session.record.clone();
        if session.persisted {
            record.touch(now, self.inner.lifetime_secs);
            self.inner.storage.update(&record, now)?;
        } else {
            record.created_at = now;
            record.touch(now, self.inner.lifetime_secs);
            self.inner.storage.create(&record)?;
        }

        trace!(session_id = %record.id, expired_at = record.expired_at, "Session saved");
        session.record = record;
        session.persisted = true;
        session.modified = false;
        Ok(())
    }

    /// Replace a handle's contents with the stored record.
    ///
    /// Unlike [`open`](Self::open) this does not slide the expiration window.
    pub fn reload(&self, session: &mut Session) -> Result<()> {
        let record = self.inner.storage.read(session.id(), self.now())?;
        session.record = record;
        session.persisted = true;
        session.modified = false;
        Ok(())
    }

    /// Remove a session by id or handle. Absent sessions are not an error.
    ///
    /// Returns `true` if a record was removed.
    pub fn destroy(&self, id: impl AsRef<str>) -> Result<bool> {
        let id = id.as_ref();
        let removed = self.inner.storage.destroy(id)?;
        if removed {
            debug!(session_id = %id, "Session destroyed");
        }
        Ok(removed)
    }

    /// Remove every session regardless of expiration.
    pub fn flush(&self) -> Result<()> {
        self.inner.storage.flush()?;
        debug!("Session storage flushed");
        Ok(())
    }

    /// Remove sessions whose `expired_at` is strictly before now.
    ///
    /// Returns the number removed.
    pub fn clean(&self) -> Result<usize> {
        let count = self.inner.storage.clean(self.now())?;
        if count > 0 {
            debug!(count, "Cleaned up expired sessions");
        }
        Ok(count)
    }
}

/// Builder for [`SessionManager`].
#[derive(Default)]
pub struct SessionManagerBuilder {
    config: SessionConfig,
    storage: Option<SharedStorage>,
    clock: Option<SharedClock>,
}

impl SessionManagerBuilder {
    /// Take lifetime, id length and attempt bound from `config`.
    ///
    /// The config's storage selection is only used if no adapter is given.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the session lifetime (truncated to whole seconds).
    pub fn lifetime(mut self, lifetime: Duration) -> Self {
        self.config.lifetime_secs = lifetime.as_secs();
        self
    }

    /// Set the length of generated identifiers.
    pub fn session_id_length(mut self, length: usize) -> Self {
        self.config.session_id_length = length;
        self
    }

    /// Set how many identifiers `create()` tries before failing.
    pub fn creation_attempts(mut self, attempts: u32) -> Self {
        self.config.creation_attempts = attempts;
        self
    }

    /// Use a ready adapter instance.
    pub fn storage(self, storage: impl SessionStorage + 'static) -> Self {
        self.shared_storage(Arc::new(storage))
    }

    /// Use an adapter the caller keeps a handle to.
    pub fn shared_storage(mut self, storage: SharedStorage) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Override the time source (defaults to [`SystemClock`]).
    pub fn clock(self, clock: impl Clock + 'static) -> Self {
        self.shared_clock(Arc::new(clock))
    }

    /// Use a time source the caller keeps a handle to.
    pub fn shared_clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Validate the configuration and build the manager.
    pub fn build(self) -> Result<SessionManager> {
        self.config.validate()?;
        let storage = match self.storage {
            Some(storage) => storage,
            None => self.config.storage.build()?,
        };
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        Ok(SessionManager::from_parts(&self.config, storage, clock))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use parking_lot::Mutex;
    use serde_json::json;

    const LIFETIME: i64 = 100;

    fn test_manager() -> (SessionManager, ManualClock) {
        let clock = ManualClock::new(1_000);
        let manager = SessionManager::builder()
            .lifetime(Duration::from_secs(LIFETIME as u64))
            .clock(clock.clone())
            .build()
            .unwrap();
        (manager, clock)
    }

    /// Adapter that reports a collision for the first `collisions` creates.
    struct CollidingStorage {
        inner: MemoryStorage,
        collisions: Mutex<u32>,
    }

    impl CollidingStorage {
        fn new(collisions: u32) -> Self {
            Self {
                inner: MemoryStorage::new(),
                collisions: Mutex::new(collisions),
            }
        }
    }

    impl SessionStorage for CollidingStorage {
        fn exists(&self, id: &str) -> Result<bool> {
            self.inner.exists(id)
        }

        fn create(&self, record: &SessionRecord) -> Result<()> {
            let mut remaining = self.collisions.lock();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(Error::DuplicateId(record.id.clone()));
            }
            self.inner.create(record)
        }

        fn update(&self, record: &SessionRecord, now: Timestamp) -> Result<()> {
            self.inner.update(record, now)
        }

        fn read(&self, id: &str, now: Timestamp) -> Result<SessionRecord> {
            self.inner.read(id, now)
        }

        fn touch(
            &self,
            id: &str,
            accessed_at: Timestamp,
            expired_at: Timestamp,
            now: Timestamp,
        ) -> Result<SessionRecord> {
            self.inner.touch(id, accessed_at, expired_at, now)
        }

        fn destroy(&self, id: &str) -> Result<bool> {
            self.inner.destroy(id)
        }
    }

    /// Adapter whose create always fails with a backend error.
    struct BrokenStorage;

    impl SessionStorage for BrokenStorage {
        fn exists(&self, _id: &str) -> Result<bool> {
            Ok(false)
        }

        fn create(&self, _record: &SessionRecord) -> Result<()> {
            Err(Error::Storage("disk on fire".into()))
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
    fn test_create_sets_timestamps() {
        let (manager, _clock) = test_manager();
        let session = manager.create().unwrap();

        assert_eq!(session.id().len(), 24);
        assert_eq!(session.created_at(), 1_000);
        assert_eq!(session.accessed_at(), 1_000);
        assert_eq!(session.expired_at(), 1_000 + LIFETIME);
        assert!(manager.exists(session.id()).unwrap());
        assert!(!session.is_modified());
    }

    #[test]
    fn test_create_retries_collisions() {
        let manager = SessionManager::builder()
            .storage(CollidingStorage::new(5))
            .creation_attempts(10)
            .build()
            .unwrap();

        let session = manager.create().unwrap();
        assert!(manager.exists(session.id()).unwrap());
    }

    #[test]
    fn test_create_gives_up_after_attempts() {
        let manager = SessionManager::builder()
            .storage(CollidingStorage::new(u32::MAX))
            .creation_attempts(3)
            .build()
            .unwrap();

        let err = manager.create().unwrap_err();
        assert!(matches!(err, Error::Creation { attempts: 3 }));
    }

    #[test]
    fn test_create_propagates_storage_errors() {
        let manager = SessionManager::builder()
            .storage(BrokenStorage)
            .build()
            .unwrap();

        assert!(matches!(manager.create(), Err(Error::Storage(_))));
    }

    #[test]
    fn test_open_slides_expiration() {
        let (manager, clock) = test_manager();
        let id = manager.create().unwrap().id().to_string();

        clock.advance_secs(40);
        let session = manager.open(&id).unwrap();
        assert_eq!(session.created_at(), 1_000);
        assert_eq!(session.accessed_at(), 1_040);
        assert_eq!(session.expired_at(), 1_040 + LIFETIME);

        // the refresh was persisted, not just applied to the handle
        let stored = manager.storage().read(&id, clock.now()).unwrap();
        assert_eq!(stored.expired_at, 1_040 + LIFETIME);
    }

    #[test]
    fn test_open_missing_and_expired() {
        let (manager, clock) = test_manager();
        assert!(manager.open("nope").unwrap_err().is_not_found());

        let id = manager.create().unwrap().id().to_string();
        clock.advance_secs(LIFETIME + 1);
        assert!(manager.open(&id).unwrap_err().is_expired());
        assert!(manager.read(&id).unwrap_err().is_expired());
    }

    #[test]
    fn test_save_after_expiry_fails() {
        let (manager, clock) = test_manager();
        let mut session = manager.create().unwrap();
        session.set("k", "v");

        clock.advance_secs(LIFETIME + 1);
        assert!(session.save().unwrap_err().is_expired());
        // handle is left as it was
        assert!(session.is_modified());
        assert_eq!(session.expired_at(), 1_000 + LIFETIME);
    }

    #[test]
    fn test_save_after_destroy_fails() {
        let (manager, _clock) = test_manager();
        let mut session = manager.create().unwrap();
        manager.destroy(&session).unwrap();

        session.set("k", "v");
        assert!(session.save().unwrap_err().is_not_found());
    }

    #[test]
    fn test_save_slides_expiration() {
        let (manager, clock) = test_manager();
        let mut session = manager.create().unwrap();

        clock.advance_secs(10);
        session.set("k", "v");
        session.save().unwrap();

        assert_eq!(session.accessed_at(), 1_010);
        assert_eq!(session.expired_at(), 1_010 + LIFETIME);
        assert!(!session.is_modified());
    }

    #[test]
    fn test_reload_discards_local_changes() {
        let (manager, clock) = test_manager();
        let mut session = manager.create().unwrap();
        session.set("saved", 1);
        session.save().unwrap();

        session.set("unsaved", 2);
        clock.advance_secs(5);
        session.reload().unwrap();

        assert!(session.is_set("saved"));
        assert!(!session.is_set("unsaved"));
        assert!(!session.is_modified());
        // reload does not slide the window
        assert_eq!(session.expired_at(), 1_000 + LIFETIME);
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let (manager, _clock) = test_manager();
        let session = manager.create().unwrap();
        let id = session.id().to_string();

        assert!(session.destroy().unwrap());
        assert!(!manager.exists(&id).unwrap());
        assert!(!manager.destroy(&id).unwrap());
    }

    #[test]
    fn test_clean_and_flush() {
        let (manager, clock) = test_manager();
        let old = manager.create().unwrap().id().to_string();
        clock.advance_secs(50);
        let young = manager.create().unwrap().id().to_string();

        clock.advance_secs(LIFETIME - 50);
        assert_eq!(manager.clean().unwrap(), 0);

        clock.advance_secs(1);
        assert_eq!(manager.clean().unwrap(), 1);
        assert!(!manager.exists(&old).unwrap());
        assert!(manager.exists(&young).unwrap());

        manager.flush().unwrap();
        assert!(manager.is_empty().unwrap());
    }

    #[test]
    fn test_open_keeps_save_from_other_handle() {
        let (manager, clock) = test_manager();
        let id = manager.create().unwrap().id().to_string();

        let stale = manager.open(&id).unwrap();
        let mut writer = manager.open(&id).unwrap();
        writer.set("cart", "saved-by-writer");
        writer.save().unwrap();

        clock.advance_secs(5);
        let reopened = manager.open(&id).unwrap();
        assert_eq!(reopened.get("cart"), Some(&json!("saved-by-writer")));
        assert!(!stale.is_set("cart"));

        let stored = manager.storage().read(&id, clock.now()).unwrap();
        assert_eq!(stored.data.get("cart"), Some(&json!("saved-by-writer")));
        assert_eq!(stored.expired_at, 1_005 + LIFETIME);
    }

    #[test]
    fn test_handles_are_independent() {
        let (manager, _clock) = test_manager();
        let id = manager.create().unwrap().id().to_string();

        let mut first = manager.open(&id).unwrap();
        let second = manager.open(&id).unwrap();
        first.set("k", json!({"nested": [1, 2]}));

        assert!(!second.is_set("k"));
        assert!(!manager.open(&id).unwrap().is_set("k"));

        first.save().unwrap();
        assert_eq!(
            manager.open(&id).unwrap().get("k"),
            Some(&json!({"nested": [1, 2]}))
        );
        assert!(!second.is_set("k"));
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let result = SessionManager::builder().session_id_length(0).build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_new_from_config() {
        let manager = SessionManager::new(
            SessionConfig::new()
                .with_lifetime(Duration::from_secs(30))
                .with_session_id_length(12),
        )
        .unwrap();

        assert_eq!(manager.lifetime(), Duration::from_secs(30));
        assert_eq!(manager.create().unwrap().id().len(), 12);
        assert_eq!(manager.len().unwrap(), 1);
    }
}
