//! Time sources for expiration decisions.
//!
//! All expiration logic reads time through the [`Clock`] trait so tests can
//! drive it with a [`ManualClock`] instead of sleeping.

use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use crate::record::Timestamp;

/// Supplies the current logical time in whole seconds.
pub trait Clock: Send + Sync + Debug {
    /// Current time.
    fn now(&self) -> Timestamp;
}

/// Clock shared between a manager and its callers.
pub type SharedClock = Arc<dyn Clock>;

/// Wall clock (unix seconds, UTC).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        chrono::Utc::now().timestamp()
    }
}

/// Manually driven clock for deterministic tests.
///
/// Clones share the same underlying time, so a test can keep one copy and
/// hand another to the manager.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(start)),
        }
    }

    /// Jump to an absolute time.
    pub fn set(&self, now: Timestamp) {
        self.now.store(now, Ordering::SeqCst);
    }

    /// Move forward by whole seconds (negative values move backward).
    ///
    /// Saturates at the ends of the timestamp range.
    pub fn advance_secs(&self, secs: i64) {
        let _ = self
            .now
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |now| {
                Some(now.saturating_add(secs))
            });
    }

    /// Move forward by a duration, truncated to whole seconds.
    pub fn advance(&self, by: Duration) {
        self.advance_secs(i64::try_from(by.as_secs()).unwrap_or(i64::MAX));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}
