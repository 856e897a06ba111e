//! Configuration for the session manager.
//!
//! A [`SessionConfig`] can be built in code with the `with_*` methods or
//! loaded from TOML, either as a bare table or under a `[session]` key:
//!
//! ```toml
//! [session]
//! lifetime_secs = 3600
//! session_id_length = 24
//!
//! [session.storage]
//! type = "sqlite"
//! path = "sessions.db"
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::storage::{MemoryStorage, SharedStorage, SqliteStorage};

/// Default configuration values.
pub mod defaults {
    /// Session lifetime (1 hour).
    pub const LIFETIME_SECS: u64 = 60 * 60;
    /// Identifier length in characters.
    pub const SESSION_ID_LENGTH: usize = crate::id::DEFAULT_ID_LENGTH;
    /// Identifier collision retries before giving up.
    pub const CREATION_ATTEMPTS: u32 = 10_000;
    pub const CLEANUP_INTERVAL_SECS: u64 = 60;
}

/// Which storage adapter to build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-process table, lost on restart.
    #[default]
    Memory,

    /// SQLite database file.
    Sqlite { path: PathBuf },
}

impl StorageConfig {
    /// Instantiate the configured adapter.
    pub fn build(&self) -> Result<SharedStorage> {
        let storage: SharedStorage = match self {
            StorageConfig::Memory => Arc::new(MemoryStorage::new()),
            StorageConfig::Sqlite { path } => Arc::new(SqliteStorage::open(path)?),
        };
        Ok(storage)
    }
}

/// Configuration for a [`SessionManager`](crate::SessionManager).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Seconds added to the access time to compute `expired_at`.
    pub lifetime_secs: u64,

    /// Length of generated session identifiers.
    pub session_id_length: usize,

    /// How many identifiers `create()` tries before failing.
    pub creation_attempts: u32,

    /// Whether callers should run the periodic cleanup task.
    pub enable_cleanup_task: bool,

    /// Interval for the cleanup task (if enabled).
    pub cleanup_interval_secs: u64,

    /// Storage adapter selection.
    pub storage: StorageConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            lifetime_secs: defaults::LIFETIME_SECS,
            session_id_length: defaults::SESSION_ID_LENGTH,
            creation_attempts: defaults::CREATION_ATTEMPTS,
            enable_cleanup_task: false,
            cleanup_interval_secs: defaults::CLEANUP_INTERVAL_SECS,
            storage: StorageConfig::Memory,
        }
    }
}

#[derive(Deserialize)]
struct Document {
    session: SessionConfig,
}

impl SessionConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the session lifetime (truncated to whole seconds).
    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime_secs = lifetime.as_secs();
        self
    }

    /// Set the identifier length.
    pub fn with_session_id_length(mut self, length: usize) -> Self {
        self.session_id_length = length;
        self
    }

    /// Set the identifier collision retry bound.
    pub fn with_creation_attempts(mut self, attempts: u32) -> Self {
        self.creation_attempts = attempts;
        self
    }

    /// Enable or disable the background cleanup task.
    pub fn with_cleanup_task(mut self, enabled: bool) -> Self {
        self.enable_cleanup_task = enabled;
        self
    }

    /// Set the cleanup interval.
    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval_secs = interval.as_secs();
        self
    }

    /// Select the storage adapter.
    pub fn with_storage(mut self, storage: StorageConfig) -> Self {
        self.storage = storage;
        self
    }

    /// Session lifetime.
    pub fn lifetime(&self) -> Duration {
        Duration::from_secs(self.lifetime_secs)
    }

    /// Cleanup task interval.
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    /// Reject values the manager cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.lifetime_secs == 0 {
            return Err(Error::Config("lifetime_secs must be greater than 0".into()));
        }
        if self.lifetime_secs > i64::MAX as u64 {
            return Err(Error::Config("lifetime_secs is out of range".into()));
        }
        if self.session_id_length == 0 {
            return Err(Error::Config(
                "session_id_length must be greater than 0".into(),
            ));
        }
        if self.creation_attempts == 0 {
            return Err(Error::Config(
                "creation_attempts must be greater than 0".into(),
            ));
        }
        if self.enable_cleanup_task && self.cleanup_interval_secs == 0 {
            return Err(Error::Config(
                "cleanup_interval_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Parse from TOML. Accepts a `[session]` table or a bare table.
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let value: toml::Table = toml::from_str(input)?;
        let config = if value.contains_key("session") {
            toml::from_str::<Document>(input)?.session
        } else {
            toml::from_str::<SessionConfig>(input)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }
}
