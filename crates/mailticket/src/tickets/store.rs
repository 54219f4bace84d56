//! Ticket persistence on top of the ticket and processed-message repositories.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::processed_repo::{self, ProcessedMessageRow};
use crate::db::stats_repo::{self, DashboardStats};
use crate::db::ticket_repo::{self, TicketFilter, TicketRow};
use crate::db::{days_before, format_timestamp, parse_timestamp, Database, DatabaseError};

use super::model::{
    email_snippet, format_ticket_number, Analysis, Category, InboundEmail, Priority, Ticket,
    TicketStatus, Tone,
};

/// Days covered by the dashboard's per-day activity series.
const RECENT_ACTIVITY_DAYS: i64 = 7;
/// Upper bound for a single listing page.
pub const MAX_PAGE_SIZE: u32 = 200;
/// Longest dashboard window, in days.
pub const MAX_DASHBOARD_DAYS: u32 = 3650;

/// Result of persisting a ticket for an inbound email.
#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome {
    /// A new ticket was written together with its processed-message record.
    Created(Ticket),
    /// The email was already ticketed. `ticket` is `None` when the original
    /// ticket has since been deleted.
    Duplicate {
        ticket_number: String,
        ticket: Option<Ticket>,
    },
}

/// Listing parameters.
#[derive(Debug, Clone, Default)]
pub struct TicketQuery {
    pub status: Option<TicketStatus>,
    pub category: Option<Category>,
    pub priority: Option<Priority>,
    pub limit: u32,
    pub offset: u32,
}

/// One page of tickets.
#[derive(Debug, Clone, Serialize)]
pub struct TicketPage {
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
    pub items: Vec<Ticket>,
}

/// Ticket store handle. Cloning is cheap.
#[derive(Clone)]
pub struct TicketStore {
    db: Database,
}

impl TicketStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Whether an idempotency key already has a processed-message record.
    pub fn is_processed(&self, key: &str) -> Result<bool, DatabaseError> {
        processed_repo::exists(&self.db, key)
    }

    /// Looks for an existing ticket for this email, by idempotency key first
    /// and content hash second. A content-hash match records this email's
    /// key against the existing ticket, so redeliveries stop at the key.
    pub fn find_existing(
        &self,
        email: &InboundEmail,
        now: DateTime<Utc>,
    ) -> Result<Option<CreateOutcome>, DatabaseError> {
        let key = email.idempotency_key();
        let hash = email.content_hash();
        self.db.with_transaction(|tx| existing_in(tx, &key, &hash, now))
    }

    /// Allocates the next ticket number and writes the ticket plus its
    /// processed-message record in one transaction.
    pub fn create(
        &self,
        email: &InboundEmail,
        analysis: &Analysis,
        now: DateTime<Utc>,
    ) -> Result<CreateOutcome, DatabaseError> {
        let key = email.idempotency_key();
        let hash = email.content_hash();

        let result = self.db.with_transaction(|tx| {
            if let Some(existing) = existing_in(tx, &key, &hash, now)? {
                return Ok(existing);
            }

            let sequence = ticket_repo::next_sequence_in(tx)?;
            let row = new_row(email, analysis, sequence, &hash, now)?;
            ticket_repo::insert_in(tx, &row)?;
            processed_repo::insert_in(
                tx,
                &ProcessedMessageRow {
                    idempotency_key: key.clone(),
                    ticket_number: row.ticket_number.clone(),
                    processed_at: format_timestamp(now),
                },
            )?;

            Ok(CreateOutcome::Created(row_to_ticket(row)?))
        });

        match result {
            // Another writer won the race between our check and insert.
            Err(e) if e.is_constraint_violation() => match self.find_existing(email, now)? {
                Some(existing) => Ok(existing),
                None => Err(e),
            },
            other => other,
        }
    }

    pub fn get(&self, ticket_number: &str) -> Result<Option<Ticket>, DatabaseError> {
        ticket_repo::find_by_number(&self.db, ticket_number)?
            .map(row_to_ticket)
            .transpose()
    }

    /// Lists tickets newest first.
    pub fn list(&self, query: &TicketQuery) -> Result<TicketPage, DatabaseError> {
        let limit = query.limit.clamp(1, MAX_PAGE_SIZE);
        let filter = TicketFilter {
            status: query.status.as_ref().map(TicketStatus::as_str),
            category: query.category.as_ref().map(Category::as_str),
            priority: query.priority.as_ref().map(Priority::as_str),
            limit,
            offset: query.offset,
        };
        let (total, rows) = ticket_repo::list(&self.db, &filter)?;
        let items = rows
            .into_iter()
            .map(row_to_ticket)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(TicketPage {
            total,
            limit,
            offset: query.offset,
            items,
        })
    }

    /// Changes a ticket's status. Returns the update time, or `None` for an
    /// unknown ticket.
    pub fn update_status(
        &self,
        ticket_number: &str,
        status: TicketStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, DatabaseError> {
        let updated =
            ticket_repo::update_status(&self.db, ticket_number, status.as_str(), &format_timestamp(now))?;
        Ok(updated.then_some(now))
    }

    pub fn mark_confirmation_sent(
        &self,
        ticket_number: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        ticket_repo::mark_confirmation_sent(&self.db, ticket_number, &format_timestamp(now))
    }

    /// Deletes a ticket. The processed-message record is kept.
    pub fn delete(&self, ticket_number: &str) -> Result<bool, DatabaseError> {
        ticket_repo::delete(&self.db, ticket_number)
    }

    /// Dashboard statistics for the last `days` days, capped at
    /// [`MAX_DASHBOARD_DAYS`].
    pub fn dashboard(&self, days: u32, now: DateTime<Utc>) -> Result<DashboardStats, DatabaseError> {
        let days = days.min(MAX_DASHBOARD_DAYS);
        let since = format_timestamp(days_before(now, i64::from(days)));
        let recent_since = format_timestamp(days_before(now, RECENT_ACTIVITY_DAYS));
        stats_repo::dashboard(&self.db, days, &since, &recent_since)
    }
}

fn existing_in(
    conn: &rusqlite::Connection,
    key: &str,
    hash: &str,
    now: DateTime<Utc>,
) -> Result<Option<CreateOutcome>, DatabaseError> {
    if let Some(record) = processed_repo::find_in(conn, key)? {
        let ticket = ticket_repo::find_by_number_in(conn, &record.ticket_number)?
            .map(row_to_ticket)
            .transpose()?;
        return Ok(Some(CreateOutcome::Duplicate {
            ticket_number: record.ticket_number,
            ticket,
        }));
    }
    if let Some(row) = ticket_repo::find_by_hash_in(conn, hash)? {
        let ticket = row_to_ticket(row)?;
        processed_repo::insert_if_absent_in(
            conn,
            &ProcessedMessageRow {
                idempotency_key: key.to_string(),
                ticket_number: ticket.ticket_number.clone(),
                processed_at: format_timestamp(now),
            },
        )?;
        return Ok(Some(CreateOutcome::Duplicate {
            ticket_number: ticket.ticket_number.clone(),
            ticket: Some(ticket),
        }));
    }
    Ok(None)
}

fn new_row(
    email: &InboundEmail,
    analysis: &Analysis,
    sequence: i64,
    hash: &str,
    now: DateTime<Utc>,
) -> Result<TicketRow, DatabaseError> {
    let key_points = serde_json::to_string(&analysis.key_points).map_err(|e| {
        DatabaseError::Corrupt {
            column: "key_points",
            reason: e.to_string(),
        }
    })?;
    let created_at = format_timestamp(now);

    Ok(TicketRow {
        ticket_number: format_ticket_number(sequence),
        sequence,
        sender_email: email.sender_email.clone(),
        sender_name: email.sender_name.clone(),
        subject: email.subject.clone(),
        body: email.body.clone(),
        email_hash: hash.to_string(),
        status: TicketStatus::Open.as_str().to_string(),
        summary: analysis.summary.clone(),
        key_points,
        category: analysis.category.map(|c| c.as_str().to_string()),
        priority: analysis.priority.as_str().to_string(),
        sentiment_tone: analysis.sentiment.map(|s| s.tone.as_str().to_string()),
        sentiment_confidence: analysis.sentiment.map(|s| s.confidence),
        suggested_reply: analysis.suggested_reply.clone(),
        word_count: email.body.split_whitespace().count() as i64,
        email_snippet: email_snippet(&email.body),
        analysis_degraded: analysis.degraded,
        source_message_id: email.message_id.clone(),
        created_at: created_at.clone(),
        updated_at: created_at,
        confirmation_sent_at: None,
    })
}

fn parse_column<T: std::str::FromStr>(value: &str, column: &'static str) -> Result<T, DatabaseError>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| DatabaseError::Corrupt {
        column,
        reason: e.to_string(),
    })
}

fn row_to_ticket(row: TicketRow) -> Result<Ticket, DatabaseError> {
    let key_points: Vec<String> =
        serde_json::from_str(&row.key_points).map_err(|e| DatabaseError::Corrupt {
            column: "key_points",
            reason: e.to_string(),
        })?;

    Ok(Ticket {
        status: parse_column(&row.status, "status")?,
        category: row
            .category
            .as_deref()
            .map(|c| parse_column::<Category>(c, "category"))
            .transpose()?,
        priority: parse_column(&row.priority, "priority")?,
        sentiment_tone: row
            .sentiment_tone
            .as_deref()
            .map(|t| parse_column::<Tone>(t, "sentiment_tone"))
            .transpose()?,
        created_at: parse_timestamp(&row.created_at, "created_at")?,
        updated_at: parse_timestamp(&row.updated_at, "updated_at")?,
        confirmation_sent_at: row
            .confirmation_sent_at
            .as_deref()
            .map(|t| parse_timestamp(t, "confirmation_sent_at"))
            .transpose()?,
        word_count: u64::try_from(row.word_count).unwrap_or_default(),
        key_points,
        ticket_number: row.ticket_number,
        sender_email: row.sender_email,
        sender_name: row.sender_name,
        subject: row.subject,
        body: row.body,
        email_snippet: row.email_snippet,
        summary: row.summary,
        sentiment_confidence: row.sentiment_confidence,
        suggested_reply: row.suggested_reply,
        analysis_degraded: row.analysis_degraded,
        source_message_id: row.source_message_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tickets::model::Sentiment;
    use chrono::{Duration, TimeZone};

    fn store() -> TicketStore {
        TicketStore::new(Database::open_in_memory().expect("Failed to create test database"))
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
    }

    fn email(message_id: Option<&str>, subject: &str) -> InboundEmail {
        InboundEmail {
            message_id: message_id.map(str::to_string),
            sender_email: "jane@example.com".to_string(),
            sender_name: Some("Jane".to_string()),
            subject: subject.to_string(),
            body: "My invoice is wrong, please help".to_string(),
        }
    }

    fn analysis() -> Analysis {
        Analysis {
            summary: Some("• Invoice issue".to_string()),
            key_points: vec!["invoice".to_string()],
            category: Some(Category::Support),
            priority: Priority::High,
            sentiment: Some(Sentiment {
                tone: Tone::Negative,
                confidence: 0.8,
            }),
            suggested_reply: Some("Hello Jane".to_string()),
            degraded: false,
        }
    }

    fn created(outcome: CreateOutcome) -> Ticket {
        match outcome {
            CreateOutcome::Created(ticket) => ticket,
            other => panic!("expected Created, got {other:?}"),
        }
    }

    #[test]
    fn test_create_writes_ticket_and_record() {
        let store = store();
        let ticket = created(store.create(&email(Some("m1"), "Invoice"), &analysis(), now()).unwrap());

        assert_eq!(ticket.ticket_number, "TKT-000001");
        assert_eq!(ticket.status, TicketStatus::Open);
        assert_eq!(ticket.category, Some(Category::Support));
        assert_eq!(ticket.sentiment_tone, Some(Tone::Negative));
        assert_eq!(ticket.word_count, 6);
        assert_eq!(ticket.source_message_id.as_deref(), Some("m1"));
        assert!(store.is_processed("m1").unwrap());
        assert_eq!(store.get("TKT-000001").unwrap(), Some(ticket));
    }

    #[test]
    fn test_create_is_idempotent_per_message() {
        let store = store();
        created(store.create(&email(Some("m1"), "Invoice"), &analysis(), now()).unwrap());
        let second = store.create(&email(Some("m1"), "Invoice"), &analysis(), now()).unwrap();

        match second {
            CreateOutcome::Duplicate { ticket_number, ticket } => {
                assert_eq!(ticket_number, "TKT-000001");
                assert!(ticket.is_some());
            }
            other => panic!("expected Duplicate, got {other:?}"),
        }
        let page = store.list(&TicketQuery { limit: 50, ..Default::default() }).unwrap();
        assert_eq!(page.total, 1);
    }

    #[test]
    fn test_same_content_without_id_is_duplicate() {
        let store = store();
        created(store.create(&email(Some("m1"), "Invoice"), &analysis(), now()).unwrap());
        let manual = store.create(&email(None, "Invoice"), &analysis(), now()).unwrap();
        assert!(matches!(manual, CreateOutcome::Duplicate { .. }));
    }

    #[test]
    fn test_content_match_records_new_message_id() {
        let store = store();
        created(store.create(&email(Some("m1"), "Invoice"), &analysis(), now()).unwrap());

        let resent = store.find_existing(&email(Some("m2"), "Invoice"), now()).unwrap();
        assert!(matches!(
            resent,
            Some(CreateOutcome::Duplicate { ref ticket_number, .. }) if ticket_number == "TKT-000001"
        ));
        assert!(store.is_processed("m2").unwrap());
        assert_eq!(
            processed_repo::find(&store.db, "m2").unwrap().unwrap().ticket_number,
            "TKT-000001"
        );
    }

    #[test]
    fn test_numbers_are_sequential() {
        let store = store();
        let a = created(store.create(&email(Some("m1"), "One"), &analysis(), now()).unwrap());
        let b = created(store.create(&email(Some("m2"), "Two"), &analysis(), now()).unwrap());
        assert_eq!(a.ticket_number, "TKT-000001");
        assert_eq!(b.ticket_number, "TKT-000002");
    }

    #[test]
    fn test_degraded_ticket_round_trips() {
        let store = store();
        let ticket = created(
            store
                .create(&email(Some("m1"), "Invoice"), &Analysis::degraded(), now())
                .unwrap(),
        );
        assert!(ticket.analysis_degraded);
        assert_eq!(ticket.priority, Priority::Medium);
        assert!(ticket.category.is_none());
        assert!(ticket.key_points.is_empty());
    }

    #[test]
    fn test_deleted_ticket_stays_processed() {
        let store = store();
        created(store.create(&email(Some("m1"), "Invoice"), &analysis(), now()).unwrap());
        assert!(store.delete("TKT-000001").unwrap());

        let again = store.create(&email(Some("m1"), "Invoice"), &analysis(), now()).unwrap();
        assert_eq!(
            again,
            CreateOutcome::Duplicate {
                ticket_number: "TKT-000001".to_string(),
                ticket: None
            }
        );
    }

    #[test]
    fn test_update_status_and_list_filter() {
        let store = store();
        created(store.create(&email(Some("m1"), "One"), &analysis(), now()).unwrap());
        created(store.create(&email(Some("m2"), "Two"), &analysis(), now()).unwrap());

        let later = now() + Duration::hours(1);
        assert_eq!(
            store.update_status("TKT-000001", TicketStatus::Closed, later).unwrap(),
            Some(later)
        );
        assert_eq!(store.update_status("TKT-000404", TicketStatus::Closed, later).unwrap(), None);

        let closed = store
            .list(&TicketQuery {
                status: Some(TicketStatus::Closed),
                limit: 50,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(closed.total, 1);
        assert_eq!(closed.items[0].ticket_number, "TKT-000001");
        assert_eq!(closed.items[0].updated_at, later);
    }

    #[test]
    fn test_list_clamps_limit() {
        let store = store();
        let page = store.list(&TicketQuery { limit: 10_000, ..Default::default() }).unwrap();
        assert_eq!(page.limit, MAX_PAGE_SIZE);
        let page = store.list(&TicketQuery::default()).unwrap();
        assert_eq!(page.limit, 1);
    }

    #[test]
    fn test_dashboard_caps_window() {
        let store = store();
        created(store.create(&email(Some("m1"), "One"), &analysis(), now()).unwrap());
        let stats = store.dashboard(u32::MAX, now()).unwrap();
        assert_eq!(stats.period_days, MAX_DASHBOARD_DAYS);
        assert_eq!(stats.total_tickets, 1);
    }

    #[test]
    fn test_dashboard_counts_new_ticket() {
        let store = store();
        created(store.create(&email(Some("m1"), "One"), &analysis(), now()).unwrap());
        let stats = store.dashboard(30, now() + Duration::minutes(5)).unwrap();
        assert_eq!(stats.total_tickets, 1);
        assert_eq!(stats.open_tickets, 1);
        assert_eq!(stats.by_category.get("Support"), Some(&1));
        assert_eq!(stats.recent_activity.len(), 1);
        assert_eq!(stats.recent_activity[0].date, "2026-03-10");
    }
}
