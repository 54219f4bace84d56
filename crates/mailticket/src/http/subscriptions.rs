//! Subscription management endpoints.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{ApiError, AppState};

/// `GET /api/webhooks/subscriptions`
pub async fn list(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let subscriptions = state.registry.list().await?;
    Ok(Json(json!({
        "count": subscriptions.len(),
        "subscriptions": subscriptions,
    })))
}

/// `POST /api/webhooks/subscriptions/create`
pub async fn create(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let subscription = state.registry.create(&state.target).await?;
    Ok(Json(json!({
        "status": "created",
        "subscription": subscription,
    })))
}

#[derive(Debug, Deserialize)]
pub struct RenewQuery {
    pub subscription_id: Option<String>,
}

/// `POST /api/webhooks/subscriptions/renew`
///
/// Renews one subscription when `subscription_id` is given, otherwise runs a
/// full renewal tick and returns its report.
pub async fn renew(
    State(state): State<AppState>,
    Query(query): Query<RenewQuery>,
) -> Result<Json<Value>, ApiError> {
    match query.subscription_id {
        Some(id) => {
            let subscription = state.registry.renew(&id).await?;
            Ok(Json(json!({
                "status": "renewed",
                "subscription": subscription,
            })))
        }
        None => {
            let report = state.scheduler.run_once().await;
            Ok(Json(json!({
                "status": "completed",
                "report": report,
            })))
        }
    }
}

/// `DELETE /api/webhooks/subscriptions/{id}`
pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.registry.delete(&id).await?;
    Ok(Json(json!({
        "status": "deleted",
        "subscription_id": id,
    })))
}
