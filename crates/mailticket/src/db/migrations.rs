//! Schema upgrades.
//!
//! The schema version lives in `PRAGMA user_version`. Each step runs in its
//! own transaction together with the version bump, so a failed step leaves
//! the database at the previous version.

use rusqlite::Connection;

use super::error::DatabaseError;

struct SchemaStep {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const STEPS: &[SchemaStep] = &[
    SchemaStep {
        version: 1,
        name: "subscriptions",
        sql: include_str!("sql/001_create_subscriptions.sql"),
    },
    SchemaStep {
        version: 2,
        name: "tickets",
        sql: include_str!("sql/002_create_tickets.sql"),
    },
    SchemaStep {
        version: 3,
        name: "processed_messages",
        sql: include_str!("sql/003_create_processed_messages.sql"),
    },
    SchemaStep {
        version: 4,
        name: "email_analyses",
        sql: include_str!("sql/004_create_email_analyses.sql"),
    },
];

/// Version the code expects after [`upgrade`].
pub fn latest_version() -> u32 {
    STEPS.last().map_or(0, |step| step.version)
}

pub fn schema_version(conn: &Connection) -> Result<u32, DatabaseError> {
    Ok(conn.query_row("PRAGMA user_version", [], |r| r.get(0))?)
}

/// Brings the schema up to [`latest_version`]. Refuses databases written by
/// a newer build.
pub fn upgrade(conn: &Connection) -> Result<(), DatabaseError> {
    let current = schema_version(conn)?;
    if current > latest_version() {
        return Err(DatabaseError::Migration {
            version: current,
            reason: format!("database is newer than this build (expects {})", latest_version()),
        });
    }

    for step in STEPS.iter().filter(|s| s.version > current) {
        log::info!("Applying schema v{} ({})", step.version, step.name);
        let failed = |e: rusqlite::Error| DatabaseError::Migration {
            version: step.version,
            reason: e.to_string(),
        };

        let tx = conn.unchecked_transaction().map_err(failed)?;
        tx.execute_batch(step.sql).map_err(failed)?;
        tx.pragma_update(None, "user_version", step.version)
            .map_err(failed)?;
        tx.commit().map_err(failed)?;
    }
    Ok(())
}
