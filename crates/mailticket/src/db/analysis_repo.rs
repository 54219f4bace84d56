//! Email analysis repository: the `email_analyses` history table.
//!
//! One row per content hash. Re-analysing the same email overwrites the
//! derived fields and the timestamp but keeps the row id.

use rusqlite::{params, Connection, Row};

use super::{Database, DatabaseError};

/// A raw analysis row from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRow {
    pub id: i64,
    pub email_hash: String,
    pub sender: Option<String>,
    pub subject: Option<String>,
    pub analyzed_at: String,
    pub summary: Option<String>,
    /// JSON array of strings.
    pub key_points: String,
    pub category: Option<String>,
    pub priority: String,
    pub sentiment_tone: Option<String>,
    pub sentiment_confidence: Option<f64>,
    pub reply: Option<String>,
    pub word_count: i64,
    pub email_snippet: String,
}

/// Optional filters for listing analyses.
#[derive(Debug, Clone, Default)]
pub struct AnalysisFilter<'a> {
    pub category: Option<&'a str>,
    pub priority: Option<&'a str>,
    pub limit: u32,
    pub offset: u32,
}

const COLUMNS: &str = "id, email_hash, sender, subject, analyzed_at, summary, key_points,
     category, priority, sentiment_tone, sentiment_confidence, reply, word_count, email_snippet";

fn map_row(row: &Row<'_>) -> rusqlite::Result<AnalysisRow> {
    Ok(AnalysisRow {
        id: row.get(0)?,
        email_hash: row.get(1)?,
        sender: row.get(2)?,
        subject: row.get(3)?,
        analyzed_at: row.get(4)?,
        summary: row.get(5)?,
        key_points: row.get(6)?,
        category: row.get(7)?,
        priority: row.get(8)?,
        sentiment_tone: row.get(9)?,
        sentiment_confidence: row.get(10)?,
        reply: row.get(11)?,
        word_count: row.get(12)?,
        email_snippet: row.get(13)?,
    })
}

/// Inserts an analysis, or refreshes the row already stored for its hash.
/// `row.id` is ignored; the stored id is returned.
pub fn upsert(db: &Database, row: &AnalysisRow) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| upsert_in(conn, row))
}

fn upsert_in(conn: &Connection, row: &AnalysisRow) -> Result<i64, DatabaseError> {
    let id = conn.query_row(
        "INSERT INTO email_analyses (email_hash, sender, subject, analyzed_at, summary,
             key_points, category, priority, sentiment_tone, sentiment_confidence, reply,
             word_count, email_snippet)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
         ON CONFLICT(email_hash) DO UPDATE SET
             analyzed_at = excluded.analyzed_at,
             summary = excluded.summary,
             key_points = excluded.key_points,
             category = excluded.category,
             priority = excluded.priority,
             sentiment_tone = excluded.sentiment_tone,
             sentiment_confidence = excluded.sentiment_confidence,
             reply = excluded.reply,
             word_count = excluded.word_count
         RETURNING id",
        params![
            row.email_hash,
            row.sender,
            row.subject,
            row.analyzed_at,
            row.summary,
            row.key_points,
            row.category,
            row.priority,
            row.sentiment_tone,
            row.sentiment_confidence,
            row.reply,
            row.word_count,
            row.email_snippet,
        ],
        |r| r.get(0),
    )?;
    Ok(id)
}

pub fn find_by_id(db: &Database, id: i64) -> Result<Option<AnalysisRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM email_analyses WHERE id = ?1"
        ))?;
        let mut rows = stmt.query_map(params![id], map_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Lists analyses, most recently analysed first, with the total matching count.
pub fn list(
    db: &Database,
    filter: &AnalysisFilter<'_>,
) -> Result<(u64, Vec<AnalysisRow>), DatabaseError> {
    db.with_conn(|conn| {
        let where_clause = "WHERE (?1 IS NULL OR category = ?1) AND (?2 IS NULL OR priority = ?2)";

        let total: u64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM email_analyses {where_clause}"),
            params![filter.category, filter.priority],
            |r| r.get(0),
        )?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM email_analyses {where_clause}
             ORDER BY analyzed_at DESC, id DESC LIMIT ?3 OFFSET ?4"
        ))?;
        let rows = stmt
            .query_map(
                params![filter.category, filter.priority, filter.limit, filter.offset],
                map_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok((total, rows))
    })
}

/// Deletes an analysis. Returns false if no row matched.
pub fn delete(db: &Database, id: i64) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let count = conn.execute("DELETE FROM email_analyses WHERE id = ?1", params![id])?;
        Ok(count > 0)
    })
}
