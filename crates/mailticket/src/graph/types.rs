//! Graph wire types.

use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::subscription::client_state::ClientState;
use crate::tickets::InboundEmail;

/// Sender address used when a message carries none.
pub const UNKNOWN_SENDER: &str = "unknown@unknown.com";
/// Subject used when a message carries none.
pub const NO_SUBJECT: &str = "No Subject";
/// Highest TLS version the notification endpoint supports.
const LATEST_SUPPORTED_TLS_VERSION: &str = "v1_2";

/// Parameters of a new change-notification subscription.
#[derive(Debug)]
pub struct SubscriptionRequest<'a> {
    pub resource: &'a str,
    pub notification_url: &'a str,
    pub change_type: &'a str,
    pub expiration: DateTime<Utc>,
    pub client_state: &'a ClientState,
}

/// Formats an expiration the way Graph accepts it.
pub fn format_expiration(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// `POST /subscriptions` body.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateSubscriptionBody<'a> {
    change_type: &'a str,
    notification_url: &'a str,
    resource: &'a str,
    expiration_date_time: String,
    client_state: &'a str,
    latest_supported_tls_version: &'static str,
}

impl<'a> From<&'a SubscriptionRequest<'a>> for CreateSubscriptionBody<'a> {
    fn from(request: &'a SubscriptionRequest<'a>) -> Self {
        Self {
            change_type: request.change_type,
            notification_url: request.notification_url,
            resource: request.resource,
            expiration_date_time: format_expiration(request.expiration),
            client_state: request.client_state.expose(),
            latest_supported_tls_version: LATEST_SUPPORTED_TLS_VERSION,
        }
    }
}

/// `PATCH /subscriptions/{id}` body.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RenewSubscriptionBody {
    pub expiration_date_time: String,
}

/// A subscription as the provider reports it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSubscription {
    pub id: String,
    #[serde(default)]
    pub resource: String,
    #[serde(default)]
    pub change_type: String,
    #[serde(default)]
    pub notification_url: String,
    pub expiration_date_time: DateTime<Utc>,
}

/// `GET /subscriptions` body.
#[derive(Deserialize)]
pub(crate) struct SubscriptionList {
    #[serde(default)]
    pub value: Vec<RemoteSubscription>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EmailAddress {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    address: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Recipient {
    #[serde(default)]
    email_address: Option<EmailAddress>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemBody {
    #[serde(default)]
    content_type: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

/// A message as returned by `GET /users/{mailbox}/messages/{id}`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphMessage {
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    from: Option<Recipient>,
    #[serde(default)]
    body: Option<ItemBody>,
}

impl GraphMessage {
    /// Converts into an inbound email, filling in defaults for missing fields.
    pub fn into_inbound(self, message_id: &str) -> InboundEmail {
        let address = self.from.and_then(|r| r.email_address).unwrap_or_default();
        let sender_email = address
            .address
            .filter(|a| !a.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_SENDER.to_string());
        let sender_name = address.name.filter(|n| !n.trim().is_empty());
        let subject = self
            .subject
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| NO_SUBJECT.to_string());

        let body = self.body.unwrap_or_default();
        let is_html = body
            .content_type
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case("html"));
        let content = body.content.unwrap_or_default();
        let body = if is_html { html_to_text(&content) } else { content.trim().to_string() };

        InboundEmail {
            message_id: Some(message_id.to_string()),
            sender_email,
            sender_name,
            subject,
            body,
        }
    }
}

static RE_TAGS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>|<br\s*/?>|</p>|<[^>]+>").unwrap()
});
static RE_BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\s*\n+").unwrap());

/// Rough HTML to text for bodies the provider would not convert.
pub fn html_to_text(html: &str) -> String {
    let text = RE_TAGS.replace_all(html, |caps: &regex::Captures<'_>| {
        let tag = caps[0].to_ascii_lowercase();
        if tag.starts_with("<br") || tag == "</p>" {
            "\n"
        } else {
            ""
        }
    });
    let text = text
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");
    RE_BLANK_LINES.replace_all(text.trim(), "\n\n").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_create_body_shape() {
        let state = ClientState::from_stored("state".to_string());
        let request = SubscriptionRequest {
            resource: "users/support@example.com/mailFolders('Inbox')/messages",
            notification_url: "https://hooks.example.com/api/webhooks/graph-notifications",
            change_type: "created",
            expiration: Utc.with_ymd_and_hms(2026, 3, 12, 10, 0, 0).unwrap(),
            client_state: &state,
        };
        let body = serde_json::to_value(CreateSubscriptionBody::from(&request)).unwrap();
        assert_eq!(body["changeType"], "created");
        assert_eq!(body["clientState"], "state");
        assert_eq!(body["expirationDateTime"], "2026-03-12T10:00:00.000Z");
        assert_eq!(body["latestSupportedTlsVersion"], "v1_2");
    }

    #[test]
    fn test_remote_subscription_parses_graph_timestamps() {
        let json = r#"{
            "id": "7f105c7d-2dc5-4530-97cd-4e7ae6534c07",
            "resource": "users/a/messages",
            "changeType": "created",
            "notificationUrl": "https://hooks.example.com",
            "expirationDateTime": "2026-03-12T10:00:00.1234567Z",
            "clientState": "never-read"
        }"#;
        let sub: RemoteSubscription = serde_json::from_str(json).unwrap();
        assert_eq!(sub.id, "7f105c7d-2dc5-4530-97cd-4e7ae6534c07");
        assert_eq!(
            sub.expiration_date_time.timestamp(),
            Utc.with_ymd_and_hms(2026, 3, 12, 10, 0, 0).unwrap().timestamp()
        );
    }

    #[test]
    fn test_message_defaults() {
        let msg: GraphMessage = serde_json::from_str("{}").unwrap();
        let email = msg.into_inbound("m1");
        assert_eq!(email.sender_email, UNKNOWN_SENDER);
        assert_eq!(email.subject, NO_SUBJECT);
        assert_eq!(email.sender_name, None);
        assert_eq!(email.body, "");
        assert_eq!(email.message_id.as_deref(), Some("m1"));
    }

    #[test]
    fn test_message_fields() {
        let json = r#"{
            "subject": "Refund",
            "from": {"emailAddress": {"name": "Jane", "address": "jane@example.com"}},
            "body": {"contentType": "text", "content": "  Please refund.  "}
        }"#;
        let email = serde_json::from_str::<GraphMessage>(json).unwrap().into_inbound("m1");
        assert_eq!(email.sender_email, "jane@example.com");
        assert_eq!(email.sender_name.as_deref(), Some("Jane"));
        assert_eq!(email.subject, "Refund");
        assert_eq!(email.body, "Please refund.");
    }

    #[test]
    fn test_html_body_is_flattened() {
        let json = r#"{"body": {"contentType": "html",
            "content": "<html><style>p{}</style><p>Hello&nbsp;there</p><p>Line<br/>two &amp; more</p></html>"}}"#;
        let email = serde_json::from_str::<GraphMessage>(json).unwrap().into_inbound("m1");
        assert_eq!(email.body, "Hello there\nLine\ntwo & more");
    }
}
