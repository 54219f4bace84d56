use std::sync::Arc;

use crate::dispatch::NotificationDispatcher;
use crate::history::Summarizer;
use crate::pipeline::TicketIntake;
use crate::subscription::{RenewalScheduler, SubscriptionRegistry, SubscriptionTarget};
use crate::tickets::TicketStore;
use crate::webhook::NotificationValidator;

/// Shared handler state. Cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SubscriptionRegistry>,
    pub validator: Arc<NotificationValidator>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub scheduler: Arc<RenewalScheduler>,
    pub intake: Arc<TicketIntake>,
    pub store: TicketStore,
    pub summarizer: Arc<Summarizer>,
    /// Resource subscribed by the create endpoint.
    pub target: SubscriptionTarget,
}
