//! Microsoft Graph: application authentication, subscription management and
//! message reads.
//!
//! The registry and the pipeline depend on the `SubscriptionApi` and
//! `MessageSource` traits rather than on `GraphClient`, so tests can swap in
//! in-memory providers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub mod auth;
pub mod client;
pub mod error;
pub mod types;

pub use auth::{AccessToken, ClientCredentialsConfig, ClientCredentialsExchange, CredentialCache, TokenExchange};
pub use client::{GraphClient, GraphConfig};
pub use error::{AuthError, FetchError, SubscriptionError};
pub use types::{RemoteSubscription, SubscriptionRequest};

use crate::tickets::InboundEmail;

/// Change-notification subscription management.
#[async_trait]
pub trait SubscriptionApi: Send + Sync {
    async fn create_subscription(
        &self,
        request: &SubscriptionRequest<'_>,
    ) -> Result<RemoteSubscription, SubscriptionError>;

    async fn list_subscriptions(&self) -> Result<Vec<RemoteSubscription>, SubscriptionError>;

    /// Moves the expiry of an existing subscription. Fails with
    /// `SubscriptionError::NotFound` when the provider no longer has it.
    async fn renew_subscription(
        &self,
        id: &str,
        expiration: DateTime<Utc>,
    ) -> Result<RemoteSubscription, SubscriptionError>;

    async fn delete_subscription(&self, id: &str) -> Result<(), SubscriptionError>;
}

/// Reads a single message of the monitored mailbox.
#[async_trait]
pub trait MessageSource: Send + Sync {
    async fn fetch_message(&self, message_id: &str) -> Result<InboundEmail, FetchError>;
}
