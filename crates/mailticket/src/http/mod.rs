//! HTTP surface: provider webhook, subscription management, ticket REST API,
//! analysis history and health.

pub mod error;
pub mod health;
pub mod history;
pub mod state;
pub mod subscriptions;
pub mod tickets;
pub mod webhook;

use axum::routing::{delete, get, patch, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use error::ApiError;
pub use state::AppState;

/// Path the provider posts notifications to.
pub const NOTIFICATION_PATH: &str = "/api/webhooks/graph-notifications";

/// Builds the router with all routes and middleware.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        // Provider callbacks
        .route(NOTIFICATION_PATH, post(webhook::graph_notifications))
        // Subscription management
        .route("/api/webhooks/subscriptions", get(subscriptions::list))
        .route("/api/webhooks/subscriptions/create", post(subscriptions::create))
        .route("/api/webhooks/subscriptions/renew", post(subscriptions::renew))
        .route("/api/webhooks/subscriptions/{id}", delete(subscriptions::remove))
        // Tickets
        .route("/api/tickets", get(tickets::list))
        .route("/api/tickets/create", post(tickets::create))
        .route("/api/tickets/stats/dashboard", get(tickets::dashboard))
        .route(
            "/api/tickets/{ticket_number}",
            get(tickets::get_one).delete(tickets::remove),
        )
        .route("/api/tickets/{ticket_number}/status", patch(tickets::update_status))
        // Analysis history
        .route("/api/summarize", post(history::summarize))
        .route("/api/history", get(history::list))
        .route("/api/history/{id}", get(history::get_one).delete(history::remove))
        .route("/api/stats", get(history::stats))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
