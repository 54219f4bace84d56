//! Authenticates notifications against the stored subscriptions.

use std::sync::Arc;

use super::{Notification, ValidationError};
use crate::subscription::SubscriptionRegistry;

/// Checks that a notification addresses a known subscription and carries
/// its client state.
pub struct NotificationValidator {
    registry: Arc<SubscriptionRegistry>,
}

impl NotificationValidator {
    pub fn new(registry: Arc<SubscriptionRegistry>) -> Self {
        Self { registry }
    }

    pub fn validate(&self, notification: &Notification) -> Result<(), ValidationError> {
        let subscription = self
            .registry
            .find(&notification.subscription_id)
            .map_err(|e| ValidationError::Lookup(e.to_string()))?
            .ok_or_else(|| ValidationError::UnknownSubscription {
                subscription_id: notification.subscription_id.clone(),
            })?;

        match notification.client_state.as_deref() {
            Some(candidate) if subscription.client_state.matches(candidate) => Ok(()),
            _ => Err(ValidationError::ClientStateMismatch {
                subscription_id: notification.subscription_id.clone(),
            }),
        }
    }
}
