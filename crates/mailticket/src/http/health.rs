use axum::extract::State;
use axum::Json;
use serde::Serialize;

use super::{ApiError, AppState};
use crate::dispatch::DispatcherStats;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub subscriptions: u64,
    pub dispatcher: DispatcherStats,
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    Ok(Json(HealthResponse {
        status: "healthy",
        subscriptions: state.registry.count()?,
        dispatcher: state.dispatcher.stats(),
    }))
}
