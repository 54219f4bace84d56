//! Statistics repository: aggregate queries behind the ticket dashboard and
//! the analysis statistics.

use std::collections::BTreeMap;

use rusqlite::{params, Connection};
use serde::Serialize;

use super::{Database, DatabaseError};

/// Label used for tickets without an AI-derived category.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// Ticket count for one calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyCount {
    pub date: String,
    pub count: u64,
}

/// Aggregated ticket statistics for a period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub period_days: u32,
    pub total_tickets: u64,
    /// Open tickets regardless of when they were created.
    pub open_tickets: u64,
    pub by_status: BTreeMap<String, u64>,
    pub by_category: BTreeMap<String, u64>,
    pub by_priority: BTreeMap<String, u64>,
    pub recent_activity: Vec<DailyCount>,
}

/// Aggregated analysis-history statistics for a period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisStats {
    pub period_days: u32,
    pub total_analyzed: u64,
    pub by_category: BTreeMap<String, u64>,
    pub by_priority: BTreeMap<String, u64>,
    pub by_sentiment: BTreeMap<String, u64>,
    /// Mean sentiment confidence, rounded to two decimals; 0 when empty.
    pub avg_sentiment_confidence: f64,
    pub recent_activity: Vec<DailyCount>,
}

/// A table with a creation timestamp column that statistics group over.
#[derive(Clone, Copy)]
struct Source {
    table: &'static str,
    time_column: &'static str,
}

const TICKETS: Source = Source {
    table: "tickets",
    time_column: "created_at",
};
const ANALYSES: Source = Source {
    table: "email_analyses",
    time_column: "analyzed_at",
};

fn group_counts(
    conn: &Connection,
    source: Source,
    column: &str,
    since: &str,
) -> Result<BTreeMap<String, u64>, DatabaseError> {
    let Source { table, time_column } = source;
    let mut stmt = conn.prepare(&format!(
        "SELECT COALESCE({column}, ?2), COUNT(*) FROM {table}
         WHERE {time_column} >= ?1 GROUP BY 1"
    ))?;
    let counts = stmt
        .query_map(params![since, UNCATEGORIZED], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?))
        })?
        .collect::<Result<BTreeMap<_, _>, _>>()?;
    Ok(counts)
}

/// Computes dashboard statistics. `since` bounds the period, `recent_since`
/// bounds the per-day activity series; both are stored-format timestamps.
pub fn dashboard(
    db: &Database,
    period_days: u32,
    since: &str,
    recent_since: &str,
) -> Result<DashboardStats, DatabaseError> {
    db.with_conn(|conn| {
        let total_tickets: u64 = conn.query_row(
            "SELECT COUNT(*) FROM tickets WHERE created_at >= ?1",
            params![since],
            |r| r.get(0),
        )?;
        let open_tickets: u64 = conn.query_row(
            "SELECT COUNT(*) FROM tickets WHERE status = 'open'",
            [],
            |r| r.get(0),
        )?;

        let by_status = group_counts(conn, TICKETS, "status", since)?;
        let by_category = group_counts(conn, TICKETS, "category", since)?;
        let by_priority = group_counts(conn, TICKETS, "priority", since)?;
        let recent_activity = daily_counts(conn, TICKETS, recent_since)?;

        Ok(DashboardStats {
            period_days,
            total_tickets,
            open_tickets,
            by_status,
            by_category,
            by_priority,
            recent_activity,
        })
    })
}

fn daily_counts(
    conn: &Connection,
    source: Source,
    since: &str,
) -> Result<Vec<DailyCount>, DatabaseError> {
    let Source { table, time_column } = source;
    let mut stmt = conn.prepare(&format!(
        "SELECT date({time_column}), COUNT(*) FROM {table}
         WHERE {time_column} >= ?1 GROUP BY 1 ORDER BY 1 ASC"
    ))?;
    let counts = stmt
        .query_map(params![since], |row| {
            Ok(DailyCount {
                date: row.get(0)?,
                count: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(counts)
}

/// Computes analysis-history statistics over the same windows as
/// [`dashboard`].
pub fn analyses(
    db: &Database,
    period_days: u32,
    since: &str,
    recent_since: &str,
) -> Result<AnalysisStats, DatabaseError> {
    db.with_conn(|conn| {
        let (total_analyzed, avg): (u64, Option<f64>) = conn.query_row(
            "SELECT COUNT(*), AVG(sentiment_confidence) FROM email_analyses
             WHERE analyzed_at >= ?1",
            params![since],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;

        Ok(AnalysisStats {
            period_days,
            total_analyzed,
            by_category: group_counts(conn, ANALYSES, "category", since)?,
            by_priority: group_counts(conn, ANALYSES, "priority", since)?,
            by_sentiment: group_counts(conn, ANALYSES, "sentiment_tone", since)?,
            avg_sentiment_confidence: (avg.unwrap_or(0.0) * 100.0).round() / 100.0,
            recent_activity: daily_counts(conn, ANALYSES, recent_since)?,
        })
    })
}
