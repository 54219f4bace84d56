//! Storage errors.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from the SQLite store.
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The database directory could not be created.
    #[error("Cannot create database directory '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A schema step failed, or the file was written by a newer build.
    #[error("Schema upgrade failed at v{version}: {reason}")]
    Migration { version: u32, reason: String },

    /// A stored value could not be decoded into its domain type.
    #[error("Corrupt value in column '{column}': {reason}")]
    Corrupt { column: &'static str, reason: String },

    /// A thread panicked while holding the connection.
    #[error("Database connection lock poisoned")]
    LockPoisoned,
}

impl DatabaseError {
    /// True when the error is a UNIQUE / PRIMARY KEY constraint violation.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            DatabaseError::Sqlite(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }
}
