//! Error types for tracker-store.

use std::fmt;
use std::path::PathBuf;

/// Result type for tracker-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in tracker-store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database error from SQLite.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The store could not be reached while taking, renewing or giving back a named lock.
    ///
    /// Distinct from [`Error::Database`] so callers never mistake a failed
    /// lock round-trip for "lock not available".
    #[error("Lock '{name}' {operation} failed: {source}")]
    Lock {
        name: String,
        operation: LockOperation,
        #[source]
        source: rusqlite::Error,
    },

    /// Malformed store connection descriptor.
    #[error("Invalid DSN: {0}")]
    InvalidDsn(String),

    /// Failed to create database directory.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// The lock round-trip that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOperation {
    Check,
    Acquire,
    Renew,
    Release,
}

impl fmt::Display for LockOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Check => write!(f, "check"),
            Self::Acquire => write!(f, "acquire"),
            Self::Renew => write!(f, "renew"),
            Self::Release => write!(f, "release"),
        }
    }
}
