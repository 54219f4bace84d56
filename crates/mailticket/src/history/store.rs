//! Analysis history persistence on top of the analysis repository.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::analysis_repo::{self, AnalysisFilter, AnalysisRow};
use crate::db::stats_repo::{self, AnalysisStats};
use crate::db::{days_before, format_timestamp, parse_timestamp, Database, DatabaseError};
use crate::tickets::model::{email_hash, email_snippet};
use crate::tickets::store::{MAX_DASHBOARD_DAYS, MAX_PAGE_SIZE};
use crate::tickets::{Analysis, Category, Priority, Tone};

/// Days covered by the per-day activity series.
const RECENT_ACTIVITY_DAYS: i64 = 7;

/// A stored analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisRecord {
    pub id: i64,
    pub email_hash: String,
    pub sender: Option<String>,
    pub subject: Option<String>,
    pub analyzed_at: DateTime<Utc>,
    pub summary: Option<String>,
    pub key_points: Vec<String>,
    pub category: Option<Category>,
    pub priority: Priority,
    pub sentiment_tone: Option<Tone>,
    pub sentiment_confidence: Option<f64>,
    pub reply: Option<String>,
    pub word_count: u64,
    pub email_snippet: String,
}

/// The email an analysis was produced for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzedText<'a> {
    pub text: &'a str,
    pub sender: Option<&'a str>,
    pub subject: Option<&'a str>,
}

impl AnalyzedText<'_> {
    pub fn content_hash(&self) -> String {
        email_hash(
            self.text,
            self.sender.unwrap_or_default(),
            self.subject.unwrap_or_default(),
        )
    }

    pub fn word_count(&self) -> u64 {
        self.text.split_whitespace().count() as u64
    }
}

/// Listing parameters.
#[derive(Debug, Clone, Default)]
pub struct HistoryQuery {
    pub category: Option<Category>,
    pub priority: Option<Priority>,
    pub limit: u32,
    pub offset: u32,
}

/// One page of analyses.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryPage {
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
    pub items: Vec<AnalysisRecord>,
}

/// Analysis history handle. Cloning is cheap.
#[derive(Clone)]
pub struct AnalysisHistory {
    db: Database,
}

impl AnalysisHistory {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Stores `analysis` for `email`, replacing an earlier analysis of the
    /// same content. Returns the record id.
    pub fn record(
        &self,
        email: &AnalyzedText<'_>,
        analysis: &Analysis,
        now: DateTime<Utc>,
    ) -> Result<i64, DatabaseError> {
        let key_points = serde_json::to_string(&analysis.key_points).map_err(|e| {
            DatabaseError::Corrupt {
                column: "key_points",
                reason: e.to_string(),
            }
        })?;
        let row = AnalysisRow {
            id: 0,
            email_hash: email.content_hash(),
            sender: email.sender.map(str::to_string),
            subject: email.subject.map(str::to_string),
            analyzed_at: format_timestamp(now),
            summary: analysis.summary.clone(),
            key_points,
            category: analysis.category.map(|c| c.as_str().to_string()),
            priority: analysis.priority.as_str().to_string(),
            sentiment_tone: analysis.sentiment.map(|s| s.tone.as_str().to_string()),
            sentiment_confidence: analysis.sentiment.map(|s| s.confidence),
            reply: analysis.suggested_reply.clone(),
            word_count: i64::try_from(email.word_count()).unwrap_or(i64::MAX),
            email_snippet: email_snippet(email.text),
        };
        analysis_repo::upsert(&self.db, &row)
    }

    pub fn get(&self, id: i64) -> Result<Option<AnalysisRecord>, DatabaseError> {
        analysis_repo::find_by_id(&self.db, id)?
            .map(row_to_record)
            .transpose()
    }

    /// Lists analyses, most recent first.
    pub fn list(&self, query: &HistoryQuery) -> Result<HistoryPage, DatabaseError> {
        let limit = query.limit.clamp(1, MAX_PAGE_SIZE);
        let filter = AnalysisFilter {
            category: query.category.as_ref().map(Category::as_str),
            priority: query.priority.as_ref().map(Priority::as_str),
            limit,
            offset: query.offset,
        };
        let (total, rows) = analysis_repo::list(&self.db, &filter)?;
        let items = rows
            .into_iter()
            .map(row_to_record)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(HistoryPage {
            total,
            limit,
            offset: query.offset,
            items,
        })
    }

    pub fn delete(&self, id: i64) -> Result<bool, DatabaseError> {
        analysis_repo::delete(&self.db, id)
    }

    /// Statistics for the last `days` days, capped at [`MAX_DASHBOARD_DAYS`].
    pub fn stats(&self, days: u32, now: DateTime<Utc>) -> Result<AnalysisStats, DatabaseError> {
        let days = days.min(MAX_DASHBOARD_DAYS);
        let since = format_timestamp(days_before(now, i64::from(days)));
        let recent_since = format_timestamp(days_before(now, RECENT_ACTIVITY_DAYS));
        stats_repo::analyses(&self.db, days, &since, &recent_since)
    }
}

fn parse_optional<T: std::str::FromStr>(
    value: Option<&str>,
    column: &'static str,
) -> Result<Option<T>, DatabaseError>
where
    T::Err: std::fmt::Display,
{
    value
        .map(|v| {
            v.parse().map_err(|e: T::Err| DatabaseError::Corrupt {
                column,
                reason: e.to_string(),
            })
        })
        .transpose()
}

fn row_to_record(row: AnalysisRow) -> Result<AnalysisRecord, DatabaseError> {
    let key_points: Vec<String> =
        serde_json::from_str(&row.key_points).map_err(|e| DatabaseError::Corrupt {
            column: "key_points",
            reason: e.to_string(),
        })?;
    let priority = row
        .priority
        .parse::<Priority>()
        .map_err(|e| DatabaseError::Corrupt {
            column: "priority",
            reason: e.to_string(),
        })?;

    Ok(AnalysisRecord {
        analyzed_at: parse_timestamp(&row.analyzed_at, "analyzed_at")?,
        category: parse_optional(row.category.as_deref(), "category")?,
        sentiment_tone: parse_optional(row.sentiment_tone.as_deref(), "sentiment_tone")?,
        word_count: u64::try_from(row.word_count).unwrap_or_default(),
        priority,
        key_points,
        id: row.id,
        email_hash: row.email_hash,
        sender: row.sender,
        subject: row.subject,
        summary: row.summary,
        sentiment_confidence: row.sentiment_confidence,
        reply: row.reply,
        email_snippet: row.email_snippet,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tickets::Sentiment;
    use chrono::{Duration, TimeZone};

    fn history() -> AnalysisHistory {
        AnalysisHistory::new(Database::open_in_memory().expect("Failed to create test database"))
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
    }

    fn analysis(category: Category, priority: Priority) -> Analysis {
        Analysis {
            summary: Some("• Asks for a refund".to_string()),
            key_points: vec!["order 4411".to_string()],
            category: Some(category),
            priority,
            sentiment: Some(Sentiment {
                tone: Tone::Negative,
                confidence: 0.9,
            }),
            suggested_reply: Some("Dear customer".to_string()),
            degraded: false,
        }
    }

    fn text(body: &str) -> AnalyzedText<'_> {
        AnalyzedText {
            text: body,
            sender: Some("sam@example.com"),
            subject: Some("Refund"),
        }
    }

    #[test]
    fn test_record_and_get() {
        let history = history();
        let id = history
            .record(&text("I want my money back."), &analysis(Category::Support, Priority::High), now())
            .unwrap();

        let record = history.get(id).unwrap().unwrap();
        assert_eq!(record.sender.as_deref(), Some("sam@example.com"));
        assert_eq!(record.category, Some(Category::Support));
        assert_eq!(record.sentiment_tone, Some(Tone::Negative));
        assert_eq!(record.key_points, vec!["order 4411".to_string()]);
        assert_eq!(record.word_count, 5);
        assert_eq!(record.analyzed_at, now());
        assert!(history.get(id + 1).unwrap().is_none());
    }

    #[test]
    fn test_reanalysis_updates_same_record() {
        let history = history();
        let first = history
            .record(&text("Same words."), &analysis(Category::Support, Priority::High), now())
            .unwrap();
        let later = now() + Duration::hours(1);
        let second = history
            .record(&text("Same words."), &analysis(Category::Sales, Priority::Low), later)
            .unwrap();

        assert_eq!(first, second);
        let page = history.list(&HistoryQuery { limit: 10, ..Default::default() }).unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].category, Some(Category::Sales));
        assert_eq!(page.items[0].analyzed_at, later);
    }

    #[test]
    fn test_list_filters_by_priority() {
        let history = history();
        history
            .record(&text("one"), &analysis(Category::Support, Priority::High), now())
            .unwrap();
        history
            .record(&text("two"), &analysis(Category::Support, Priority::Low), now())
            .unwrap();

        let page = history
            .list(&HistoryQuery {
                priority: Some(Priority::Low),
                limit: 10,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].priority, Priority::Low);
    }

    #[test]
    fn test_stats_cap_window() {
        let history = history();
        history
            .record(&text("one"), &analysis(Category::Hr, Priority::High), now())
            .unwrap();
        let stats = history.stats(u32::MAX, now()).unwrap();
        assert_eq!(stats.period_days, MAX_DASHBOARD_DAYS);
        assert_eq!(stats.total_analyzed, 1);
        assert_eq!(stats.by_category.get("HR"), Some(&1));
        assert_eq!(stats.avg_sentiment_confidence, 0.9);
    }
}
