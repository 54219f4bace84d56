//! Ticket repository: CRUD operations for the `tickets` table and the
//! ticket number counter.

use rusqlite::{params, Connection, Row};

use super::{Database, DatabaseError};

/// Counter name used for ticket numbers.
const TICKET_COUNTER: &str = "ticket";

/// A raw ticket row from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct TicketRow {
    pub ticket_number: String,
    pub sequence: i64,
    pub sender_email: String,
    pub sender_name: Option<String>,
    pub subject: String,
    pub body: String,
    pub email_hash: String,
    pub status: String,
    pub summary: Option<String>,
    /// JSON array of strings.
    pub key_points: String,
    pub category: Option<String>,
    pub priority: String,
    pub sentiment_tone: Option<String>,
    pub sentiment_confidence: Option<f64>,
    pub suggested_reply: Option<String>,
    pub word_count: i64,
    pub email_snippet: String,
    pub analysis_degraded: bool,
    pub source_message_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub confirmation_sent_at: Option<String>,
}

/// Optional filters for listing tickets.
#[derive(Debug, Clone, Default)]
pub struct TicketFilter<'a> {
    pub status: Option<&'a str>,
    pub category: Option<&'a str>,
    pub priority: Option<&'a str>,
    pub limit: u32,
    pub offset: u32,
}

const COLUMNS: &str = "ticket_number, sequence, sender_email, sender_name, subject, body,
     email_hash, status, summary, key_points, category, priority, sentiment_tone,
     sentiment_confidence, suggested_reply, word_count, email_snippet, analysis_degraded,
     source_message_id, created_at, updated_at, confirmation_sent_at";

fn map_row(row: &Row<'_>) -> rusqlite::Result<TicketRow> {
    Ok(TicketRow {
        ticket_number: row.get(0)?,
        sequence: row.get(1)?,
        sender_email: row.get(2)?,
        sender_name: row.get(3)?,
        subject: row.get(4)?,
        body: row.get(5)?,
        email_hash: row.get(6)?,
        status: row.get(7)?,
        summary: row.get(8)?,
        key_points: row.get(9)?,
        category: row.get(10)?,
        priority: row.get(11)?,
        sentiment_tone: row.get(12)?,
        sentiment_confidence: row.get(13)?,
        suggested_reply: row.get(14)?,
        word_count: row.get(15)?,
        email_snippet: row.get(16)?,
        analysis_degraded: row.get(17)?,
        source_message_id: row.get(18)?,
        created_at: row.get(19)?,
        updated_at: row.get(20)?,
        confirmation_sent_at: row.get(21)?,
    })
}

/// Increments and returns the ticket counter. Values are never handed out
/// twice, even when the ticket that used one is later deleted.
pub fn next_sequence_in(conn: &Connection) -> Result<i64, DatabaseError> {
    let value: i64 = conn.query_row(
        "INSERT INTO counters (name, value) VALUES (?1, 1)
         ON CONFLICT(name) DO UPDATE SET value = value + 1
         RETURNING value",
        params![TICKET_COUNTER],
        |r| r.get(0),
    )?;
    Ok(value)
}

/// Inserts a ticket on an open connection or transaction.
pub fn insert_in(conn: &Connection, row: &TicketRow) -> Result<(), DatabaseError> {
    conn.execute(
        &format!(
            "INSERT INTO tickets ({COLUMNS}) VALUES
             (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18,
              ?19, ?20, ?21, ?22)"
        ),
        params![
            row.ticket_number,
            row.sequence,
            row.sender_email,
            row.sender_name,
            row.subject,
            row.body,
            row.email_hash,
            row.status,
            row.summary,
            row.key_points,
            row.category,
            row.priority,
            row.sentiment_tone,
            row.sentiment_confidence,
            row.suggested_reply,
            row.word_count,
            row.email_snippet,
            row.analysis_degraded,
            row.source_message_id,
            row.created_at,
            row.updated_at,
            row.confirmation_sent_at,
        ],
    )?;
    Ok(())
}

fn find_one_in(
    conn: &Connection,
    column: &str,
    value: &str,
) -> Result<Option<TicketRow>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM tickets WHERE {column} = ?1"
    ))?;
    let mut rows = stmt.query_map(params![value], map_row)?;
    match rows.next() {
        Some(Ok(row)) => Ok(Some(row)),
        Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
        None => Ok(None),
    }
}

/// Finds a ticket by its number on an open connection or transaction.
pub fn find_by_number_in(
    conn: &Connection,
    ticket_number: &str,
) -> Result<Option<TicketRow>, DatabaseError> {
    find_one_in(conn, "ticket_number", ticket_number)
}

/// Finds a ticket by its content hash on an open connection or transaction.
pub fn find_by_hash_in(conn: &Connection, email_hash: &str) -> Result<Option<TicketRow>, DatabaseError> {
    find_one_in(conn, "email_hash", email_hash)
}

/// Finds a ticket by its number.
pub fn find_by_number(db: &Database, ticket_number: &str) -> Result<Option<TicketRow>, DatabaseError> {
    db.with_conn(|conn| find_by_number_in(conn, ticket_number))
}

/// Finds a ticket by its content hash.
pub fn find_by_hash(db: &Database, email_hash: &str) -> Result<Option<TicketRow>, DatabaseError> {
    db.with_conn(|conn| find_by_hash_in(conn, email_hash))
}

/// Lists tickets newest first. Returns the total matching count (ignoring
/// limit/offset) together with the requested page.
pub fn list(db: &Database, filter: &TicketFilter<'_>) -> Result<(u64, Vec<TicketRow>), DatabaseError> {
    db.with_conn(|conn| {
        let mut conditions = Vec::new();
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(status) = filter.status {
            conditions.push(format!("status = ?{}", param_values.len() + 1));
            param_values.push(Box::new(status.to_string()));
        }
        if let Some(category) = filter.category {
            conditions.push(format!("category = ?{}", param_values.len() + 1));
            param_values.push(Box::new(category.to_string()));
        }
        if let Some(priority) = filter.priority {
            conditions.push(format!("priority = ?{}", param_values.len() + 1));
            param_values.push(Box::new(priority.to_string()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();

        let total: u64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM tickets {where_clause}"),
            params_ref.as_slice(),
            |r| r.get(0),
        )?;

        let sql = format!(
            "SELECT {COLUMNS} FROM tickets {where_clause}
             ORDER BY sequence DESC LIMIT {} OFFSET {}",
            filter.limit, filter.offset
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_ref.as_slice(), map_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok((total, rows))
    })
}

/// Updates the status of a ticket. Returns false if no row matched.
pub fn update_status(
    db: &Database,
    ticket_number: &str,
    status: &str,
    updated_at: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let count = conn.execute(
            "UPDATE tickets SET status = ?2, updated_at = ?3 WHERE ticket_number = ?1",
            params![ticket_number, status, updated_at],
        )?;
        Ok(count > 0)
    })
}

/// Stamps the time the confirmation notice went out.
pub fn mark_confirmation_sent(
    db: &Database,
    ticket_number: &str,
    sent_at: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let count = conn.execute(
            "UPDATE tickets SET confirmation_sent_at = ?2 WHERE ticket_number = ?1",
            params![ticket_number, sent_at],
        )?;
        Ok(count > 0)
    })
}

/// Deletes a ticket. Returns false if no row matched.
pub fn delete(db: &Database, ticket_number: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let count = conn.execute(
            "DELETE FROM tickets WHERE ticket_number = ?1",
            params![ticket_number],
        )?;
        Ok(count > 0)
    })
}
