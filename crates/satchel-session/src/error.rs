//! Error types for session operations.

/// Error type for session operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No record is held for the identifier.
    #[error("Session not found: {0}")]
    NotFound(String),

    /// A record exists but its expiration time has passed.
    #[error("Session expired: {0}")]
    Expired(String),

    /// No free identifier was found within the configured attempt bound.
    #[error("Session cannot be created after {attempts} attempts")]
    Creation { attempts: u32 },

    /// The storage already holds a record under this identifier.
    #[error("Duplicate session id: {0}")]
    DuplicateId(String),

    /// The storage adapter does not implement a contract operation.
    #[error("Storage operation not implemented: {0}")]
    NotImplemented(&'static str),

    /// Error from the storage backend.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Session data could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid or unreadable configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for [`Error::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// True for [`Error::Expired`].
    pub fn is_expired(&self) -> bool {
        matches!(self, Error::Expired(_))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, Error>;
