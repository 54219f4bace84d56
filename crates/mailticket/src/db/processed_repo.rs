//! Processed message repository: the idempotency ledger.
//!
//! Rows are append-only: once a key is recorded it is never updated or removed,
//! and a second insert for the same key fails with a constraint violation.

use rusqlite::{params, Connection};

use super::{Database, DatabaseError};

/// A processed message record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedMessageRow {
    /// Provider message id, or `sha256:<hex>` content hash when no id is known.
    pub idempotency_key: String,
    pub ticket_number: String,
    pub processed_at: String,
}

/// Inserts a record on an open connection or transaction.
pub fn insert_in(conn: &Connection, row: &ProcessedMessageRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO processed_messages (idempotency_key, ticket_number, processed_at)
         VALUES (?1, ?2, ?3)",
        params![row.idempotency_key, row.ticket_number, row.processed_at],
    )?;
    Ok(())
}

/// Records a key unless it is already present. Returns whether a row was
/// written; an existing record is left untouched.
pub fn insert_if_absent_in(
    conn: &Connection,
    row: &ProcessedMessageRow,
) -> Result<bool, DatabaseError> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO processed_messages (idempotency_key, ticket_number, processed_at)
         VALUES (?1, ?2, ?3)",
        params![row.idempotency_key, row.ticket_number, row.processed_at],
    )?;
    Ok(inserted > 0)
}

/// Finds the record for a key on an open connection or transaction.
pub fn find_in(conn: &Connection, key: &str) -> Result<Option<ProcessedMessageRow>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT idempotency_key, ticket_number, processed_at
         FROM processed_messages WHERE idempotency_key = ?1",
    )?;
    let mut rows = stmt.query_map(params![key], |row| {
        Ok(ProcessedMessageRow {
            idempotency_key: row.get(0)?,
            ticket_number: row.get(1)?,
            processed_at: row.get(2)?,
        })
    })?;
    match rows.next() {
        Some(Ok(row)) => Ok(Some(row)),
        Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
        None => Ok(None),
    }
}

/// Finds the record for a key.
pub fn find(db: &Database, key: &str) -> Result<Option<ProcessedMessageRow>, DatabaseError> {
    db.with_conn(|conn| find_in(conn, key))
}

/// Whether a key has already been processed.
pub fn exists(db: &Database, key: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let count: u32 = conn.query_row(
            "SELECT COUNT(*) FROM processed_messages WHERE idempotency_key = ?1",
            params![key],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    })
}

/// Counts all processed records.
pub fn count(db: &Database) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 =
            conn.query_row("SELECT COUNT(*) FROM processed_messages", [], |r| r.get(0))?;
        Ok(count)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    fn sample(key: &str, ticket: &str) -> ProcessedMessageRow {
        ProcessedMessageRow {
            idempotency_key: key.to_string(),
            ticket_number: ticket.to_string(),
            processed_at: "2026-01-01T00:00:00.000Z".to_string(),
        }
    }

    #[test]
    fn test_insert_and_find() {
        let db = test_db();
        db.with_conn(|conn| insert_in(conn, &sample("AAMk-1", "TKT-000001")))
            .unwrap();

        assert!(exists(&db, "AAMk-1").unwrap());
        assert!(!exists(&db, "AAMk-2").unwrap());
        assert_eq!(
            find(&db, "AAMk-1").unwrap(),
            Some(sample("AAMk-1", "TKT-000001"))
        );
        assert_eq!(count(&db).unwrap(), 1);
    }

    #[test]
    fn test_second_insert_for_same_key_fails() {
        let db = test_db();
        db.with_conn(|conn| insert_in(conn, &sample("AAMk-1", "TKT-000001")))
            .unwrap();
        let err = db
            .with_conn(|conn| insert_in(conn, &sample("AAMk-1", "TKT-000002")))
            .unwrap_err();
        assert!(err.is_constraint_violation());
        assert_eq!(find(&db, "AAMk-1").unwrap().unwrap().ticket_number, "TKT-000001");
    }

    #[test]
    fn test_insert_if_absent_keeps_first_record() {
        let db = test_db();
        let first = db
            .with_conn(|conn| insert_if_absent_in(conn, &sample("AAMk-1", "TKT-000001")))
            .unwrap();
        let second = db
            .with_conn(|conn| insert_if_absent_in(conn, &sample("AAMk-1", "TKT-000002")))
            .unwrap();
        assert!(first);
        assert!(!second);
        assert_eq!(find(&db, "AAMk-1").unwrap().unwrap().ticket_number, "TKT-000001");
    }
}
