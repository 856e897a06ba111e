//! Ephemeral session store with sliding expiration.
//!
//! This crate associates opaque key/value data with a random identifier
//! across otherwise stateless interactions:
//! - Collision-resistant identifier generation
//! - Sliding expiration driven by an injectable [`Clock`]
//! - Pluggable storage through the [`SessionStorage`] trait, with in-memory
//!   and SQLite adapters
//! - Optional periodic cleanup of expired sessions
//!
//! # Example
//!
//! ```rust,ignore
//! use satchel_session::{SessionConfig, SessionManager};
//!
//! let manager = SessionManager::new(SessionConfig::default())?;
//!
//! // Request #1
//! let mut session = manager.create()?;
//! session.set("user", "ada").set("visits", 1);
//! session.save()?;
//! let sid = session.id().to_string(); // hand this to the client
//!
//! // Request #2
//! let session = manager.open(&sid)?;
//! assert_eq!(session.get_or("user", ""), "ada");
//! ```

mod cleanup;
mod clock;
mod config;
mod error;
mod id;
mod manager;
mod record;
mod session;
mod storage;

pub use cleanup::{CleanupHandle, spawn_cleanup_task, spawn_configured_cleanup};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{SessionConfig, StorageConfig, defaults};
pub use error::{Error, Result};
pub use id::{ALPHABET, DEFAULT_ID_LENGTH, IdGenerator};
pub use manager::{SessionManager, SessionManagerBuilder};
pub use record::{SessionData, SessionRecord, Timestamp};
pub use session::Session;
pub use storage::{MemoryStorage, SessionStorage, SharedStorage, SqliteStorage};
