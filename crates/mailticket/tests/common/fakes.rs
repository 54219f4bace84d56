//! In-memory collaborators.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use mailticket::analysis::{AnalysisError, Analyzer};
use mailticket::graph::{
    FetchError, MessageSource, RemoteSubscription, SubscriptionApi, SubscriptionError,
    SubscriptionRequest,
};
use mailticket::notify::{ConfirmationSender, DeliveryError};
use mailticket::tickets::{Analysis, Category, InboundEmail, Priority, Sentiment, Ticket, Tone};

/// Mailbox provider holding subscriptions and messages in memory.
#[derive(Default)]
pub struct FakeGraph {
    remote: Mutex<Vec<RemoteSubscription>>,
    next_id: AtomicU32,
    messages: Mutex<HashMap<String, InboundEmail>>,
    fetches: AtomicU32,
    reject_creates: AtomicBool,
}

impl FakeGraph {
    pub fn add_message(&self, message_id: &str, sender: &str, subject: &str, body: &str) {
        self.messages.lock().unwrap().insert(
            message_id.to_string(),
            InboundEmail {
                message_id: Some(message_id.to_string()),
                sender_email: sender.to_string(),
                sender_name: None,
                subject: subject.to_string(),
                body: body.to_string(),
            },
        );
    }

    /// Registers a subscription the provider already knows about.
    pub fn seed_remote(&self, subscription: RemoteSubscription) {
        self.remote.lock().unwrap().push(subscription);
    }

    pub fn remote(&self) -> Vec<RemoteSubscription> {
        self.remote.lock().unwrap().clone()
    }

    pub fn remote_by_id(&self, id: &str) -> Option<RemoteSubscription> {
        self.remote().into_iter().find(|s| s.id == id)
    }

    /// Makes subscription creation fail as a failed validation handshake does.
    pub fn set_reject_creates(&self, reject: bool) {
        self.reject_creates.store(reject, Ordering::SeqCst);
    }

    pub fn fetch_count(&self) -> u32 {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SubscriptionApi for FakeGraph {
    async fn create_subscription(
        &self,
        request: &SubscriptionRequest<'_>,
    ) -> Result<RemoteSubscription, SubscriptionError> {
        if self.reject_creates.load(Ordering::SeqCst) {
            return Err(SubscriptionError::Rejected {
                status: 400,
                message: "Subscription validation request failed".to_string(),
            });
        }
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let subscription = RemoteSubscription {
            id: format!("sub-{n}"),
            resource: request.resource.to_string(),
            change_type: request.change_type.to_string(),
            notification_url: request.notification_url.to_string(),
            expiration_date_time: request.expiration,
        };
        self.remote.lock().unwrap().push(subscription.clone());
        Ok(subscription)
    }

    async fn list_subscriptions(&self) -> Result<Vec<RemoteSubscription>, SubscriptionError> {
        Ok(self.remote())
    }

    async fn renew_subscription(
        &self,
        id: &str,
        expiration: DateTime<Utc>,
    ) -> Result<RemoteSubscription, SubscriptionError> {
        let mut remote = self.remote.lock().unwrap();
        let subscription = remote
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| SubscriptionError::NotFound { id: id.to_string() })?;
        subscription.expiration_date_time = expiration;
        Ok(subscription.clone())
    }

    async fn delete_subscription(&self, id: &str) -> Result<(), SubscriptionError> {
        let mut remote = self.remote.lock().unwrap();
        let before = remote.len();
        remote.retain(|s| s.id != id);
        if remote.len() == before {
            return Err(SubscriptionError::NotFound { id: id.to_string() });
        }
        Ok(())
    }
}

#[async_trait]
impl MessageSource for FakeGraph {
    async fn fetch_message(&self, message_id: &str) -> Result<InboundEmail, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.messages
            .lock()
            .unwrap()
            .get(message_id)
            .cloned()
            .ok_or_else(|| FetchError::Gone {
                message_id: message_id.to_string(),
            })
    }
}

/// Analysis service returning a fixed result, optionally slow or failing.
#[derive(Default)]
pub struct FakeAnalyzer {
    failing: AtomicBool,
    delay: Mutex<Duration>,
    calls: AtomicU32,
}

impl FakeAnalyzer {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Analyzer for FakeAnalyzer {
    async fn analyze(&self, _email: &InboundEmail) -> Result<Analysis, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(AnalysisError::Rejected {
                status: 503,
                message: "model overloaded".into(),
            });
        }
        Ok(Analysis {
            summary: Some("Customer cannot log in".into()),
            key_points: vec!["Login fails".into(), "Started today".into()],
            category: Some(Category::Support),
            priority: Priority::High,
            sentiment: Some(Sentiment {
                tone: Tone::Negative,
                confidence: 0.8,
            }),
            suggested_reply: Some("We are looking into it.".into()),
            degraded: false,
        })
    }
}

/// Confirmation mailer that records ticket numbers.
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<String>>,
}

impl RecordingSender {
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConfirmationSender for RecordingSender {
    async fn send_confirmation(&self, ticket: &Ticket) -> Result<(), DeliveryError> {
        self.sent.lock().unwrap().push(ticket.ticket_number.clone());
        Ok(())
    }
}
