//! Subscription registry: creates, lists, renews and deletes remote
//! subscriptions and keeps one local record per monitored resource.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{info, instrument, warn};

use super::locks::KeyedLocks;
use super::{ClientState, Subscription, CHANGE_TYPE_CREATED};
use crate::db::subscription_repo;
use crate::db::{format_timestamp, Database};
use crate::graph::{RemoteSubscription, SubscriptionApi, SubscriptionError, SubscriptionRequest};
use crate::sanitize;

/// Longest lifetime Graph accepts for mail resources (just under three days).
pub const DEFAULT_SUBSCRIPTION_LIFETIME_MINUTES: i64 = 4230;

/// Subscription request parameters.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub lifetime: Duration,
    pub change_type: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            lifetime: Duration::minutes(DEFAULT_SUBSCRIPTION_LIFETIME_MINUTES),
            change_type: CHANGE_TYPE_CREATED.to_string(),
        }
    }
}

/// A resource to monitor and where its notifications go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionTarget {
    pub resource: String,
    pub notification_url: String,
}

impl SubscriptionTarget {
    /// Inbox of `mailbox`, notifying `{webhook_base}/api/webhooks/graph-notifications`.
    pub fn inbox(mailbox: &str, webhook_base: &str) -> Self {
        Self {
            resource: format!("users/{mailbox}/mailFolders('Inbox')/messages"),
            notification_url: format!(
                "{}/api/webhooks/graph-notifications",
                webhook_base.trim_end_matches('/')
            ),
        }
    }
}

/// Registry of subscriptions backed by the provider API and the local store.
pub struct SubscriptionRegistry {
    api: Arc<dyn SubscriptionApi>,
    db: Database,
    config: RegistryConfig,
    locks: KeyedLocks,
}

impl SubscriptionRegistry {
    pub fn new(api: Arc<dyn SubscriptionApi>, db: Database, config: RegistryConfig) -> Self {
        Self {
            api,
            db,
            config,
            locks: KeyedLocks::new(),
        }
    }

    /// Subscribes `target.resource`, replacing any subscription already held
    /// for it. The stale subscription is deleted remotely and locally first,
    /// so a failed create leaves the resource without a record.
    #[instrument(skip_all, fields(resource = %target.resource))]
    pub async fn create(&self, target: &SubscriptionTarget) -> Result<Subscription, SubscriptionError> {
        let _guard = self.locks.lock(&target.resource).await;

        if let Some(stale) = subscription_repo::find_by_resource(&self.db, &target.resource)? {
            match self.api.delete_subscription(&stale.id).await {
                Ok(()) | Err(SubscriptionError::NotFound { .. }) => {
                    info!(id = %sanitize::short_id(&stale.id), "Removed previous subscription");
                }
                Err(e) => {
                    warn!(id = %sanitize::short_id(&stale.id), error = %e, "Could not delete previous subscription");
                }
            }
            subscription_repo::delete(&self.db, &stale.id)?;
        }

        let client_state = ClientState::generate()?;
        let now = Utc::now();
        let request = SubscriptionRequest {
            resource: &target.resource,
            notification_url: &target.notification_url,
            change_type: &self.config.change_type,
            expiration: now + self.config.lifetime,
            client_state: &client_state,
        };
        let remote = self.api.create_subscription(&request).await?;

        let subscription = Subscription {
            id: remote.id,
            resource: target.resource.clone(),
            change_type: self.config.change_type.clone(),
            notification_url: target.notification_url.clone(),
            expiration_time: remote.expiration_date_time,
            client_state,
        };
        subscription_repo::replace_for_resource(&self.db, &subscription.to_row(now))?;

        info!(
            id = %sanitize::short_id(&subscription.id),
            expires = %subscription.expiration_time,
            "Subscription created"
        );
        Ok(subscription)
    }

    /// Lists local subscriptions after reconciling them with the provider:
    /// records the provider no longer knows are purged.
    pub async fn list(&self) -> Result<Vec<Subscription>, SubscriptionError> {
        let remote = self.api.list_subscriptions().await?;
        let known: HashSet<&str> = remote.iter().map(|s| s.id.as_str()).collect();

        let mut kept = Vec::new();
        for row in subscription_repo::list_all(&self.db)? {
            if known.contains(row.id.as_str()) {
                kept.push(Subscription::from_row(row)?);
            } else {
                let _guard = self.locks.lock(&row.resource).await;
                subscription_repo::delete(&self.db, &row.id)?;
                info!(id = %sanitize::short_id(&row.id), "Purged subscription unknown to provider");
            }
        }
        Ok(kept)
    }

    /// Subscriptions as the provider reports them, including ones this process
    /// did not create.
    pub async fn list_remote(&self) -> Result<Vec<RemoteSubscription>, SubscriptionError> {
        self.api.list_subscriptions().await
    }

    /// Local records without contacting the provider.
    pub fn local(&self) -> Result<Vec<Subscription>, SubscriptionError> {
        subscription_repo::list_all(&self.db)?
            .into_iter()
            .map(|row| Subscription::from_row(row).map_err(SubscriptionError::from))
            .collect()
    }

    /// Looks up a local record by id.
    pub fn find(&self, id: &str) -> Result<Option<Subscription>, SubscriptionError> {
        subscription_repo::find_by_id(&self.db, id)?
            .map(Subscription::from_row)
            .transpose()
            .map_err(SubscriptionError::from)
    }

    /// Looks up the local record for a resource.
    pub fn find_for_resource(&self, resource: &str) -> Result<Option<Subscription>, SubscriptionError> {
        subscription_repo::find_by_resource(&self.db, resource)?
            .map(Subscription::from_row)
            .transpose()
            .map_err(SubscriptionError::from)
    }

    /// Extends a subscription to the full lifetime from now. Only the
    /// expiration changes. `NotFound` means the caller must `create` instead.
    #[instrument(skip(self), fields(id = %sanitize::short_id(id)))]
    pub async fn renew(&self, id: &str) -> Result<Subscription, SubscriptionError> {
        let resource = self
            .find(id)?
            .ok_or_else(|| SubscriptionError::NotFound { id: id.to_string() })?
            .resource;
        let _guard = self.locks.lock(&resource).await;

        // Re-read under the lock; a concurrent create may have replaced it.
        let mut subscription = self
            .find(id)?
            .ok_or_else(|| SubscriptionError::NotFound { id: id.to_string() })?;

        let now = Utc::now();
        let remote = self
            .api
            .renew_subscription(id, now + self.config.lifetime)
            .await?;

        subscription.expiration_time = remote.expiration_date_time;
        subscription_repo::update_expiration(
            &self.db,
            id,
            &format_timestamp(subscription.expiration_time),
            &format_timestamp(now),
        )?;

        info!(expires = %subscription.expiration_time, "Subscription renewed");
        Ok(subscription)
    }

    /// Deletes a subscription. The remote call is best-effort; the local
    /// record is removed regardless. Returns whether a local record existed.
    #[instrument(skip(self), fields(id = %sanitize::short_id(id)))]
    pub async fn delete(&self, id: &str) -> Result<bool, SubscriptionError> {
        let key = match self.find(id)? {
            Some(sub) => sub.resource,
            None => id.to_string(),
        };
        let _guard = self.locks.lock(&key).await;

        match self.api.delete_subscription(id).await {
            Ok(()) => info!("Subscription deleted"),
            Err(SubscriptionError::NotFound { .. }) => info!("Subscription already gone at provider"),
            Err(e) => warn!(error = %e, "Remote delete failed, removing local record anyway"),
        }
        let removed = subscription_repo::delete(&self.db, id)?;
        self.locks.prune();
        Ok(removed)
    }

    /// Deletes every subscription the provider reports plus all local
    /// records. Returns how many remote subscriptions were removed.
    pub async fn purge(&self) -> Result<usize, SubscriptionError> {
        let mut removed = 0;
        for remote in self.api.list_subscriptions().await? {
            self.delete(&remote.id).await?;
            removed += 1;
        }
        for row in subscription_repo::list_all(&self.db)? {
            self.delete(&row.id).await?;
        }
        Ok(removed)
    }

    /// Number of local records.
    pub fn count(&self) -> Result<u64, SubscriptionError> {
        Ok(subscription_repo::count(&self.db)?)
    }
}
