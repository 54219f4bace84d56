//! One-off email analysis that records its result in the history.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::store::{AnalysisHistory, AnalyzedText};
use crate::analysis::Analyzer;
use crate::tickets::{Analysis, Category, InboundEmail, Priority, Sentiment, Tone};

/// Sentences kept by the fallback summary.
const FALLBACK_SENTENCES: usize = 3;
/// Character cap for the fallback summary.
const FALLBACK_MAX_CHARS: usize = 800;

/// Text submitted for analysis.
#[derive(Debug, Clone, Default)]
pub struct SummaryRequest {
    pub text: String,
    pub sender: Option<String>,
    pub subject: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryMetadata {
    pub analyzed_at: DateTime<Utc>,
    pub word_count: u64,
    /// History record id; absent when nothing was stored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_id: Option<i64>,
    /// Why the analysis fell back to a plain extract.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Analysis result as returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub summary: Option<String>,
    pub key_points: Vec<String>,
    pub category: Option<Category>,
    pub priority: Priority,
    pub sentiment: Sentiment,
    pub reply: Option<String>,
    pub metadata: SummaryMetadata,
}

impl Summary {
    fn from_analysis(analysis: Analysis, metadata: SummaryMetadata) -> Self {
        Self {
            summary: analysis.summary,
            key_points: analysis.key_points,
            category: analysis.category,
            priority: analysis.priority,
            sentiment: analysis.sentiment.unwrap_or(NEUTRAL),
            reply: analysis.suggested_reply,
            metadata,
        }
    }
}

const NEUTRAL: Sentiment = Sentiment {
    tone: Tone::Neutral,
    confidence: 0.0,
};

/// Runs the analyzer on submitted text and keeps the result in the history.
///
/// Never fails: an empty body or an analyzer error produces a placeholder
/// answer that is not stored, and a storage error only drops `database_id`.
pub struct Summarizer {
    analyzer: Arc<dyn Analyzer>,
    history: AnalysisHistory,
}

impl Summarizer {
    pub fn new(analyzer: Arc<dyn Analyzer>, history: AnalysisHistory) -> Self {
        Self { analyzer, history }
    }

    pub async fn summarize(&self, request: SummaryRequest) -> Summary {
        let sender = non_empty(request.sender.as_deref());
        let subject = non_empty(request.subject.as_deref());
        let text = AnalyzedText {
            text: &request.text,
            sender,
            subject,
        };
        let now = Utc::now();
        let metadata = SummaryMetadata {
            analyzed_at: now,
            word_count: text.word_count(),
            database_id: None,
            error: None,
        };

        if request.text.trim().is_empty() {
            return Summary {
                summary: Some("No email body detected.".to_string()),
                key_points: Vec::new(),
                category: Some(Category::General),
                priority: Priority::Low,
                sentiment: NEUTRAL,
                reply: None,
                metadata,
            };
        }

        let email = InboundEmail {
            message_id: None,
            sender_email: sender.unwrap_or_default().to_string(),
            sender_name: None,
            subject: subject.unwrap_or_default().to_string(),
            body: request.text.clone(),
        };
        let analysis = match self.analyzer.analyze(&email).await {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!(error = %e, "Analysis failed, returning plain extract");
                return Summary {
                    summary: Some(leading_sentences(&request.text)),
                    key_points: Vec::new(),
                    category: Some(Category::General),
                    priority: Priority::Medium,
                    sentiment: NEUTRAL,
                    reply: None,
                    metadata: SummaryMetadata {
                        error: Some(e.to_string()),
                        ..metadata
                    },
                };
            }
        };

        let database_id = match self.history.record(&text, &analysis, now) {
            Ok(id) => {
                info!(id, "Analysis recorded");
                Some(id)
            }
            Err(e) => {
                warn!(error = %e, "Failed to record analysis");
                None
            }
        };
        Summary::from_analysis(
            analysis,
            SummaryMetadata {
                database_id,
                ..metadata
            },
        )
    }

    pub fn history(&self) -> &AnalysisHistory {
        &self.history
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// First sentences of `text` on one line, capped at [`FALLBACK_MAX_CHARS`].
fn leading_sentences(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut end = flat.len();
    let mut seen = 0;
    let mut chars = flat.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') && chars.peek().is_some_and(|&(_, next)| next == ' ') {
            seen += 1;
            if seen == FALLBACK_SENTENCES {
                end = i + c.len_utf8();
                break;
            }
        }
    }
    let head = &flat[..end];
    if head.chars().count() > FALLBACK_MAX_CHARS {
        let cut: String = head.chars().take(FALLBACK_MAX_CHARS).collect();
        format!("{cut}...")
    } else {
        head.to_string()
    }
}
