//! SQLite storage.
//!
//! One connection behind a mutex, shared by the subscription registry and
//! the ticket store. Timestamps are RFC 3339 UTC strings with millisecond
//! precision, so string order is time order.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use rusqlite::{Connection, Transaction};

pub mod analysis_repo;
pub mod error;
pub mod migrations;
pub mod processed_repo;
pub mod stats_repo;
pub mod subscription_repo;
pub mod ticket_repo;

pub use error::DatabaseError;

/// Shared handle; clones refer to the same connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens the file at `path`, creating parent directories, and upgrades
    /// the schema.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|source| DatabaseError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let db = Self::prepare(Connection::open(path)?, true)?;
        log::info!("Ticket database ready at {}", path.display());
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Self::prepare(Connection::open_in_memory()?, false)
    }

    fn prepare(conn: Connection, wal: bool) -> Result<Self, DatabaseError> {
        if wal {
            conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        }
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::upgrade(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        let guard = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        f(&guard)
    }

    /// Runs `f` in a transaction that commits only if `f` succeeds.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, DatabaseError>,
    {
        let mut guard = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        let tx = guard.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}

/// Returns the canonical database path: `~/.mailticket/data/mailticket.db`.
pub fn default_database_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".mailticket").join("data").join("mailticket.db"))
}

/// Formats a timestamp the way every table stores it.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Start of a reporting window of `days` days ending at `now`, never earlier
/// than the Unix epoch.
pub fn days_before(now: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    let epoch = DateTime::<Utc>::default();
    TimeDelta::try_days(days)
        .and_then(|window| now.checked_sub_signed(window))
        .map_or(epoch, |start| start.max(epoch))
}

/// Parses a stored timestamp.
pub fn parse_timestamp(value: &str, column: &'static str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::Corrupt {
            column,
            reason: format!("{value:?}: {e}"),
        })
}
