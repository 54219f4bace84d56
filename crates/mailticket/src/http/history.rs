//! Analysis endpoints: on-demand summaries and their history.

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use super::tickets::{dashboard_days, parse_filter, DashboardQuery, DEFAULT_PAGE_SIZE};
use super::{ApiError, AppState};
use crate::db::stats_repo::AnalysisStats;
use crate::history::{AnalysisRecord, HistoryPage, HistoryQuery, Summary, SummaryRequest};
use crate::tickets::store::MAX_PAGE_SIZE;

#[derive(Debug, Deserialize)]
pub struct SummarizeBody {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
}

/// `POST /api/summarize`
pub async fn summarize(
    State(state): State<AppState>,
    Json(body): Json<SummarizeBody>,
) -> Json<Summary> {
    Json(
        state
            .summarizer
            .summarize(SummaryRequest {
                text: body.text,
                sender: body.sender,
                subject: body.subject,
            })
            .await,
    )
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryListQuery {
    pub category: Option<String>,
    pub priority: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// `GET /api/history`
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<HistoryListQuery>,
) -> Result<Json<HistoryPage>, ApiError> {
    let query = HistoryQuery {
        category: parse_filter(query.category.as_deref())?,
        priority: parse_filter(query.priority.as_deref())?,
        limit: query.limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE),
        offset: query.offset.unwrap_or(0),
    };
    Ok(Json(state.summarizer.history().list(&query)?))
}

/// `GET /api/history/{id}`
pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<AnalysisRecord>, ApiError> {
    state
        .summarizer
        .history()
        .get(id)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Analysis {id} not found")))
}

/// `DELETE /api/history/{id}`
pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    if !state.summarizer.history().delete(id)? {
        return Err(ApiError::NotFound(format!("Analysis {id} not found")));
    }
    Ok(Json(json!({
        "message": "Analysis deleted successfully",
        "id": id,
    })))
}

/// `GET /api/stats`
pub async fn stats(
    State(state): State<AppState>,
    Query(query): Query<DashboardQuery>,
) -> Result<Json<AnalysisStats>, ApiError> {
    let days = dashboard_days(&query)?;
    Ok(Json(state.summarizer.history().stats(days, Utc::now())?))
}
