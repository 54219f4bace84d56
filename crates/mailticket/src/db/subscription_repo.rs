//! Subscription repository: CRUD operations for the `subscriptions` table.
//!
//! At most one row exists per monitored resource; `replace_for_resource`
//! swaps the row for a resource atomically.

use rusqlite::{params, Row};

use super::{Database, DatabaseError};

/// A raw subscription row from the database.
#[derive(Clone)]
pub struct SubscriptionRow {
    pub id: String,
    pub resource: String,
    pub change_type: String,
    pub notification_url: String,
    pub client_state: String,
    pub expiration_time: String,
    pub created_at: String,
    pub updated_at: String,
}

impl std::fmt::Debug for SubscriptionRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRow")
            .field("id", &self.id)
            .field("resource", &self.resource)
            .field("change_type", &self.change_type)
            .field("notification_url", &self.notification_url)
            .field("client_state", &"<redacted>")
            .field("expiration_time", &self.expiration_time)
            .finish()
    }
}

const COLUMNS: &str = "id, resource, change_type, notification_url, client_state,
     expiration_time, created_at, updated_at";

fn map_row(row: &Row<'_>) -> rusqlite::Result<SubscriptionRow> {
    Ok(SubscriptionRow {
        id: row.get(0)?,
        resource: row.get(1)?,
        change_type: row.get(2)?,
        notification_url: row.get(3)?,
        client_state: row.get(4)?,
        expiration_time: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

/// Stores `row`, removing any previous row for the same resource or id.
pub fn replace_for_resource(db: &Database, row: &SubscriptionRow) -> Result<(), DatabaseError> {
    db.with_transaction(|tx| {
        tx.execute(
            "DELETE FROM subscriptions WHERE resource = ?1 OR id = ?2",
            params![row.resource, row.id],
        )?;
        tx.execute(
            "INSERT INTO subscriptions (id, resource, change_type, notification_url,
             client_state, expiration_time, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                row.id,
                row.resource,
                row.change_type,
                row.notification_url,
                row.client_state,
                row.expiration_time,
                row.created_at,
                row.updated_at,
            ],
        )?;
        Ok(())
    })
}

/// Finds a subscription by its provider-assigned id.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<SubscriptionRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM subscriptions WHERE id = ?1"
        ))?;
        let mut rows = stmt.query_map(params![id], map_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Finds the subscription for a monitored resource.
pub fn find_by_resource(
    db: &Database,
    resource: &str,
) -> Result<Option<SubscriptionRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM subscriptions WHERE resource = ?1"
        ))?;
        let mut rows = stmt.query_map(params![resource], map_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Lists all subscriptions, soonest expiry first.
pub fn list_all(db: &Database) -> Result<Vec<SubscriptionRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM subscriptions ORDER BY expiration_time ASC"
        ))?;
        let rows = stmt
            .query_map([], map_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Moves the expiration of a subscription. Returns false if no row matched.
pub fn update_expiration(
    db: &Database,
    id: &str,
    expiration_time: &str,
    updated_at: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let count = conn.execute(
            "UPDATE subscriptions SET expiration_time = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, expiration_time, updated_at],
        )?;
        Ok(count > 0)
    })
}

/// Deletes a subscription. Returns false if no row matched.
pub fn delete(db: &Database, id: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let count = conn.execute("DELETE FROM subscriptions WHERE id = ?1", params![id])?;
        Ok(count > 0)
    })
}

/// Counts stored subscriptions.
pub fn count(db: &Database) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row("SELECT COUNT(*) FROM subscriptions", [], |r| r.get(0))?;
        Ok(count)
    })
}
