//! Fully assembled service over in-memory collaborators.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tower::ServiceExt;

use mailticket::app::{assemble, Components, ServiceConfig};
use mailticket::db::subscription_repo::{self, SubscriptionRow};
use mailticket::db::{format_timestamp, Database};
use mailticket::dispatch::DispatcherConfig;
use mailticket::graph::RemoteSubscription;
use mailticket::http::{router, AppState, NOTIFICATION_PATH};
use mailticket::subscription::{
    RegistryConfig, RenewalConfig, Subscription, SubscriptionTarget, CHANGE_TYPE_CREATED,
};

use super::fakes::{FakeAnalyzer, FakeGraph, RecordingSender};

pub const MAILBOX: &str = "support@example.com";
pub const WEBHOOK_BASE: &str = "https://hooks.example.com";

/// Response captured from the router.
pub struct TestResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub text: String,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.text).expect("response body is not JSON")
    }
}

pub struct TestApp {
    pub state: AppState,
    pub router: Router,
    pub db: Database,
    pub graph: Arc<FakeGraph>,
    pub analyzer: Arc<FakeAnalyzer>,
    pub sender: Arc<RecordingSender>,
}

impl TestApp {
    /// Service without automatic subscription coverage.
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(adjust: impl FnOnce(&mut ServiceConfig)) -> Self {
        let db = Database::open_in_memory().expect("Failed to open database");
        let graph = Arc::new(FakeGraph::default());
        let analyzer = Arc::new(FakeAnalyzer::default());
        let sender = Arc::new(RecordingSender::default());

        let mut config = ServiceConfig {
            target: Self::target(),
            registry: RegistryConfig::default(),
            renewal: RenewalConfig::default(),
            dispatcher: DispatcherConfig {
                workers: 2,
                queue_capacity: 16,
                run_timeout: Duration::from_secs(5),
            },
        };
        adjust(&mut config);

        let state = assemble(
            Components {
                db: db.clone(),
                subscriptions: graph.clone(),
                messages: graph.clone(),
                analyzer: analyzer.clone(),
                confirmations: sender.clone(),
            },
            config,
        );

        Self {
            router: router(state.clone()),
            state,
            db,
            graph,
            analyzer,
            sender,
        }
    }

    pub fn target() -> SubscriptionTarget {
        SubscriptionTarget::inbox(MAILBOX, WEBHOOK_BASE)
    }

    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> TestResponse {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();
        self.send(request).await
    }

    /// Posts a raw body to the notification endpoint.
    pub async fn notify(&self, query: &str, body: impl Into<Body>) -> TestResponse {
        let request = Request::builder()
            .method(Method::POST)
            .uri(format!("{NOTIFICATION_PATH}{query}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(body.into())
            .unwrap();
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        TestResponse {
            status,
            content_type,
            text: String::from_utf8(bytes.to_vec()).unwrap(),
        }
    }

    /// Creates a subscription for the mailbox through the registry.
    pub async fn subscribe(&self) -> Subscription {
        self.state.registry.create(&Self::target()).await.unwrap()
    }

    /// Stores a subscription both remotely (when `remote` is set) and locally
    /// with the given expiry.
    pub fn seed_subscription(&self, id: &str, expires: DateTime<Utc>, remote: bool) {
        let target = Self::target();
        if remote {
            self.graph.seed_remote(RemoteSubscription {
                id: id.to_string(),
                resource: target.resource.clone(),
                change_type: CHANGE_TYPE_CREATED.to_string(),
                notification_url: target.notification_url.clone(),
                expiration_date_time: expires,
            });
        }
        let now = format_timestamp(Utc::now());
        subscription_repo::replace_for_resource(
            &self.db,
            &SubscriptionRow {
                id: id.to_string(),
                resource: target.resource,
                change_type: CHANGE_TYPE_CREATED.to_string(),
                notification_url: target.notification_url,
                client_state: "seeded-client-state".to_string(),
                expiration_time: format_timestamp(expires),
                created_at: now.clone(),
                updated_at: now,
            },
        )
        .unwrap();
    }

    /// Waits until the dispatcher has finished `count` runs.
    pub async fn wait_for_runs(&self, count: u64) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let stats = self.state.dispatcher.stats();
            if stats.completed + stats.failed + stats.timed_out >= count {
                return;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for {count} runs: {stats:?}"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

/// Builds a notification envelope entry.
pub fn notification(subscription_id: &str, client_state: &str, message_id: &str) -> Value {
    serde_json::json!({
        "subscriptionId": subscription_id,
        "changeType": "created",
        "clientState": client_state,
        "resource": format!("Users/{MAILBOX}/Messages/{message_id}"),
        "resourceData": {
            "@odata.type": "#Microsoft.Graph.Message",
            "id": message_id
        }
    })
}

pub fn envelope(entries: Vec<Value>) -> String {
    serde_json::json!({ "value": entries }).to_string()
}
