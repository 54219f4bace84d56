//! Change-notification subscriptions: the local registry and the renewal
//! scheduler that keeps them alive.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::db::subscription_repo::SubscriptionRow;
use crate::db::{format_timestamp, parse_timestamp, DatabaseError};

pub mod client_state;
pub mod locks;
pub mod registry;
pub mod scheduler;

pub use client_state::ClientState;
pub use registry::{RegistryConfig, SubscriptionRegistry, SubscriptionTarget};
pub use scheduler::{RenewalConfig, RenewalReport, RenewalScheduler};

/// Change type the pipeline subscribes to.
pub const CHANGE_TYPE_CREATED: &str = "created";

/// A subscription known to this process.
///
/// The client state is skipped on serialization; it only ever leaves the
/// process in the create request.
#[derive(Debug, Clone, Serialize)]
pub struct Subscription {
    pub id: String,
    pub resource: String,
    pub change_type: String,
    pub notification_url: String,
    pub expiration_time: DateTime<Utc>,
    #[serde(skip)]
    pub client_state: ClientState,
}

impl Subscription {
    /// Whether the remaining lifetime is below `threshold`.
    pub fn needs_renewal(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        self.expiration_time - now < threshold
    }

    pub(crate) fn from_row(row: SubscriptionRow) -> Result<Self, DatabaseError> {
        Ok(Self {
            expiration_time: parse_timestamp(&row.expiration_time, "expiration_time")?,
            client_state: ClientState::from_stored(row.client_state),
            id: row.id,
            resource: row.resource,
            change_type: row.change_type,
            notification_url: row.notification_url,
        })
    }

    pub(crate) fn to_row(&self, now: DateTime<Utc>) -> SubscriptionRow {
        SubscriptionRow {
            id: self.id.clone(),
            resource: self.resource.clone(),
            change_type: self.change_type.clone(),
            notification_url: self.notification_url.clone(),
            client_state: self.client_state.expose().to_string(),
            expiration_time: format_timestamp(self.expiration_time),
            created_at: format_timestamp(now),
            updated_at: format_timestamp(now),
        }
    }
}
