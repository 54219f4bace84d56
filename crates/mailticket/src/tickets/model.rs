//! Ticket domain types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Characters of the body that feed the content hash.
const HASH_BODY_CHARS: usize = 500;
/// Characters of the body kept as the snippet.
const SNIPPET_CHARS: usize = 200;

/// Formats a ticket sequence value as a ticket number (`TKT-000001`).
pub fn format_ticket_number(sequence: i64) -> String {
    format!("TKT-{sequence:06}")
}

/// SHA-256 over the first 500 body characters, sender and subject.
pub fn email_hash(body: &str, sender_email: &str, subject: &str) -> String {
    let head: String = body.chars().take(HASH_BODY_CHARS).collect();
    let mut hasher = Sha256::new();
    hasher.update(head.as_bytes());
    hasher.update(sender_email.as_bytes());
    hasher.update(subject.as_bytes());
    hex::encode(hasher.finalize())
}

/// First 200 body characters, with `...` when truncated.
pub fn email_snippet(body: &str) -> String {
    if body.chars().count() > SNIPPET_CHARS {
        let head: String = body.chars().take(SNIPPET_CHARS).collect();
        format!("{head}...")
    } else {
        body.to_string()
    }
}

/// Error returned when a string is not a known enum value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind} '{value}', expected one of: {expected}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
    pub expected: &'static str,
}

macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(ParseEnumError {
                        kind: $kind,
                        value: other.to_string(),
                        expected: concat!($($text, " "),+),
                    }),
                }
            }
        }
    };
}

string_enum!(
    /// Workflow state of a ticket.
    TicketStatus, "status", {
        Open => "open",
        InProgress => "in-progress",
        Closed => "closed",
    }
);

string_enum!(
    /// Business area the message belongs to.
    Category, "category", {
        Sales => "Sales",
        Support => "Support",
        General => "General",
        Marketing => "Marketing",
        Hr => "HR",
    }
);

string_enum!(
    /// Urgency of a ticket.
    Priority, "priority", {
        High => "High",
        Medium => "Medium",
        Low => "Low",
    }
);

string_enum!(
    /// Overall tone of the sender.
    Tone, "tone", {
        Positive => "Positive",
        Neutral => "Neutral",
        Negative => "Negative",
        Urgent => "Urgent",
    }
);

/// Detected sentiment with a 0..=1 confidence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    pub tone: Tone,
    pub confidence: f64,
}

/// An inbound email, either fetched from the mailbox or submitted manually.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEmail {
    /// Provider message id; absent for manual submissions.
    pub message_id: Option<String>,
    pub sender_email: String,
    pub sender_name: Option<String>,
    pub subject: String,
    pub body: String,
}

impl InboundEmail {
    /// Content hash used for duplicate detection.
    pub fn content_hash(&self) -> String {
        email_hash(&self.body, &self.sender_email, &self.subject)
    }

    /// Key recorded in the processed-message ledger.
    pub fn idempotency_key(&self) -> String {
        match &self.message_id {
            Some(id) => id.clone(),
            None => format!("sha256:{}", self.content_hash()),
        }
    }
}

/// Derived analysis fields attached to a ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub summary: Option<String>,
    pub key_points: Vec<String>,
    pub category: Option<Category>,
    pub priority: Priority,
    pub sentiment: Option<Sentiment>,
    pub suggested_reply: Option<String>,
    /// Set when analysis failed and the ticket carries no derived fields.
    pub degraded: bool,
}

impl Analysis {
    /// Placeholder used when the analysis collaborator fails.
    pub fn degraded() -> Self {
        Self {
            summary: None,
            key_points: Vec::new(),
            category: None,
            priority: Priority::Medium,
            sentiment: None,
            suggested_reply: None,
            degraded: true,
        }
    }
}

/// A persisted support ticket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ticket {
    pub ticket_number: String,
    pub sender_email: String,
    pub sender_name: Option<String>,
    pub subject: String,
    pub body: String,
    pub email_snippet: String,
    pub word_count: u64,
    pub status: TicketStatus,
    pub summary: Option<String>,
    pub key_points: Vec<String>,
    pub category: Option<Category>,
    pub priority: Priority,
    pub sentiment_tone: Option<Tone>,
    pub sentiment_confidence: Option<f64>,
    pub suggested_reply: Option<String>,
    pub analysis_degraded: bool,
    pub source_message_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub confirmation_sent_at: Option<DateTime<Utc>>,
}

impl Ticket {
    /// Name used to greet the sender: the display name, or the local part of
    /// the address with separators turned into spaces and words capitalized.
    pub fn greeting_name(&self) -> String {
        if let Some(name) = self.sender_name.as_deref().map(str::trim) {
            if !name.is_empty() && name != self.sender_email {
                return name.to_string();
            }
        }
        let local = self.sender_email.split('@').next().unwrap_or_default();
        local
            .split(['.', '_', '-'])
            .filter(|w| !w.is_empty())
            .map(|w| {
                let mut chars = w.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                    None => String::new(),
                }
            })
            .collect::<Vec<String>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ticket(sender_email: &str, sender_name: Option<&str>) -> Ticket {
        let at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        Ticket {
            ticket_number: "TKT-000001".to_string(),
            sender_email: sender_email.to_string(),
            sender_name: sender_name.map(str::to_string),
            subject: "s".to_string(),
            body: "b".to_string(),
            email_snippet: "b".to_string(),
            word_count: 1,
            status: TicketStatus::Open,
            summary: None,
            key_points: Vec::new(),
            category: None,
            priority: Priority::Medium,
            sentiment_tone: None,
            sentiment_confidence: None,
            suggested_reply: None,
            analysis_degraded: true,
            source_message_id: None,
            created_at: at,
            updated_at: at,
            confirmation_sent_at: None,
        }
    }

    #[test]
    fn test_ticket_number_format() {
        assert_eq!(format_ticket_number(1), "TKT-000001");
        assert_eq!(format_ticket_number(123456), "TKT-123456");
        assert_eq!(format_ticket_number(1234567), "TKT-1234567");
    }

    #[test]
    fn test_email_hash_uses_body_prefix() {
        let long_a = format!("{}{}", "x".repeat(500), "tail one");
        let long_b = format!("{}{}", "x".repeat(500), "tail two");
        assert_eq!(
            email_hash(&long_a, "a@example.com", "Hi"),
            email_hash(&long_b, "a@example.com", "Hi")
        );
        assert_ne!(
            email_hash("body", "a@example.com", "Hi"),
            email_hash("body", "b@example.com", "Hi")
        );
        assert_eq!(email_hash("body", "a@example.com", "Hi").len(), 64);
    }

    #[test]
    fn test_snippet_truncates_on_char_boundary() {
        assert_eq!(email_snippet("short"), "short");
        let long = "é".repeat(250);
        let snippet = email_snippet(&long);
        assert!(snippet.ends_with("..."));
        assert_eq!(snippet.chars().count(), 203);
    }

    #[test]
    fn test_enums_parse_and_display() {
        assert_eq!("in-progress".parse::<TicketStatus>().unwrap(), TicketStatus::InProgress);
        assert_eq!(Category::Hr.to_string(), "HR");
        assert_eq!("Low".parse::<Priority>().unwrap(), Priority::Low);
        let err = "urgent".parse::<Priority>().unwrap_err();
        assert_eq!(err.kind, "priority");
        assert!(err.to_string().contains("High"));
        assert_eq!(serde_json::to_string(&TicketStatus::InProgress).unwrap(), "\"in-progress\"");
    }

    #[test]
    fn test_idempotency_key_prefers_message_id() {
        let mut email = InboundEmail {
            message_id: Some("AAMk-1".to_string()),
            sender_email: "a@example.com".to_string(),
            sender_name: None,
            subject: "Hi".to_string(),
            body: "Body".to_string(),
        };
        assert_eq!(email.idempotency_key(), "AAMk-1");
        email.message_id = None;
        assert_eq!(email.idempotency_key(), format!("sha256:{}", email.content_hash()));
    }

    #[test]
    fn test_degraded_analysis_defaults_to_medium() {
        let analysis = Analysis::degraded();
        assert!(analysis.degraded);
        assert_eq!(analysis.priority, Priority::Medium);
        assert!(analysis.summary.is_none());
        assert!(analysis.category.is_none());
    }

    #[test]
    fn test_greeting_name() {
        assert_eq!(ticket("jane@example.com", Some("Jane Doe")).greeting_name(), "Jane Doe");
        assert_eq!(ticket("john.smith@example.com", None).greeting_name(), "John Smith");
        assert_eq!(
            ticket("mary_ann@example.com", Some("mary_ann@example.com")).greeting_name(),
            "Mary Ann"
        );
    }
}
