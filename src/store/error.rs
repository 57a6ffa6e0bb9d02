//! Error types for alarm store operations

use std::fmt;

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations
#[derive(Debug)]
pub enum StoreError {
    /// A concurrent writer already created a record for the same alarm group
    AlreadyExists,

    /// No record matches the mutation key (it vanished or the match set
    /// changed between classification and mutation)
    NotFound,

    /// Database connection failed
    ConnectionFailed(String),

    /// Database query failed
    QueryFailed(String),

    /// Migration failed
    MigrationFailed(String),

    /// Record serialization/deserialization error
    Serialization(String),

    /// I/O error (file access, etc.)
    Io(std::io::Error),
}

impl StoreError {
    /// Whether the caller should retry with backoff (backend trouble) as
    /// opposed to re-classifying or giving up
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::ConnectionFailed(_)
                | StoreError::QueryFailed(_)
                | StoreError::MigrationFailed(_)
                | StoreError::Io(_)
        )
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::AlreadyExists => {
                write!(f, "a record for this alarm group already exists")
            }
            StoreError::NotFound => write!(f, "no record matches the mutation key"),
            StoreError::ConnectionFailed(msg) => {
                write!(f, "failed to connect to alarm store: {}", msg)
            }
            StoreError::QueryFailed(msg) => write!(f, "store query failed: {}", msg),
            StoreError::MigrationFailed(msg) => write!(f, "database migration failed: {}", msg),
            StoreError::Serialization(msg) => write!(f, "record serialization error: {}", msg),
            StoreError::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

// sqlx error conversion (used in sqlite.rs)
#[cfg(feature = "storage-sqlite")]
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(io_err) => StoreError::Io(io_err),
            sqlx::Error::RowNotFound => StoreError::NotFound,
            _ => StoreError::QueryFailed(err.to_string()),
        }
    }
}

#[cfg(feature = "storage-sqlite")]
impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StoreError::MigrationFailed(err.to_string())
    }
}
