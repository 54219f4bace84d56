//! Notification payload parsing.
//!
//! The envelope is parsed strictly; entries are parsed one by one so a single
//! odd entry never fails the batch.

use serde::Deserialize;
use serde_json::Value;

use super::ValidationError;

/// A change notification that passed structural parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub subscription_id: String,
    /// Id of the changed message.
    pub resource_id: String,
    pub client_state: Option<String>,
    pub change_type: String,
}

impl Notification {
    pub fn is_created(&self) -> bool {
        self.change_type.eq_ignore_ascii_case("created")
    }
}

/// Result of parsing a notification body.
#[derive(Debug, Default)]
pub struct NotificationBatch {
    pub notifications: Vec<Notification>,
    /// Entries dropped during parsing, with the reason.
    pub rejected: Vec<ValidationError>,
}

impl NotificationBatch {
    /// Number of entries in the envelope.
    pub fn received(&self) -> usize {
        self.notifications.len() + self.rejected.len()
    }
}

#[derive(Deserialize)]
struct Envelope {
    value: Vec<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNotification {
    subscription_id: String,
    #[serde(default)]
    client_state: Option<String>,
    #[serde(default)]
    change_type: Option<String>,
    #[serde(default)]
    resource_data: Option<ResourceData>,
    #[serde(default)]
    resource_id: Option<String>,
}

#[derive(Deserialize)]
struct ResourceData {
    #[serde(default)]
    id: Option<String>,
}

impl TryFrom<RawNotification> for Notification {
    type Error = ValidationError;

    fn try_from(raw: RawNotification) -> Result<Self, Self::Error> {
        let resource_id = raw
            .resource_data
            .and_then(|data| data.id)
            .or(raw.resource_id)
            .filter(|id| !id.trim().is_empty())
            .ok_or(ValidationError::MissingResourceId)?;

        Ok(Self {
            subscription_id: raw.subscription_id,
            resource_id,
            client_state: raw.client_state,
            change_type: raw.change_type.unwrap_or_default(),
        })
    }
}

/// Parses a notification body. Fails only when the envelope itself is
/// unusable.
pub fn parse_batch(body: &[u8]) -> Result<NotificationBatch, ValidationError> {
    let envelope: Envelope =
        serde_json::from_slice(body).map_err(|e| ValidationError::MalformedBody(e.to_string()))?;

    let mut batch = NotificationBatch::default();
    for entry in envelope.value {
        let parsed = serde_json::from_value::<RawNotification>(entry)
            .map_err(|e| ValidationError::MalformedEntry(e.to_string()))
            .and_then(Notification::try_from);
        match parsed {
            Ok(notification) => batch.notifications.push(notification),
            Err(e) => batch.rejected.push(e),
        }
    }
    Ok(batch)
}
