//! Ticket REST endpoints.

use std::str::FromStr;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{ApiError, AppState};
use crate::db::stats_repo::DashboardStats;
use crate::pipeline::{AnalysisMode, IntakeOutcome};
use crate::tickets::store::{MAX_DASHBOARD_DAYS, MAX_PAGE_SIZE};
use crate::tickets::{InboundEmail, Ticket, TicketPage, TicketQuery, TicketStatus};

pub(super) const DEFAULT_PAGE_SIZE: u32 = 50;
const DEFAULT_DASHBOARD_DAYS: u32 = 30;

#[derive(Debug, Deserialize)]
pub struct TicketCreate {
    pub sender_email: String,
    #[serde(default)]
    pub sender_name: Option<String>,
    pub subject: String,
    pub body: String,
}

/// `POST /api/tickets/create`
///
/// Synchronous ticket creation. Unlike the webhook path, an analysis failure
/// is reported to the caller and nothing is stored.
pub async fn create(
    State(state): State<AppState>,
    Json(request): Json<TicketCreate>,
) -> Result<Json<Value>, ApiError> {
    let sender_email = request.sender_email.trim().to_string();
    if !sender_email.contains('@') {
        return Err(ApiError::BadRequest(format!(
            "invalid sender_email '{sender_email}'"
        )));
    }

    let email = InboundEmail {
        message_id: None,
        sender_email,
        sender_name: request.sender_name.filter(|n| !n.trim().is_empty()),
        subject: request.subject,
        body: request.body,
    };

    let response = match state.intake.submit(email, AnalysisMode::Strict).await? {
        IntakeOutcome::Created {
            ticket,
            confirmation_sent,
        } => json!({
            "ticket_number": ticket.ticket_number,
            "status": "created",
            "message": "Ticket created successfully",
            "confirmation_sent": confirmation_sent,
            "ticket": ticket,
        }),
        IntakeOutcome::Duplicate {
            ticket_number,
            ticket,
        } => json!({
            "ticket_number": ticket_number,
            "status": "duplicate",
            "message": "A ticket for this email already exists",
            "existing_ticket": ticket,
        }),
    };
    Ok(Json(response))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub category: Option<String>,
    pub priority: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

pub(super) fn parse_filter<T>(value: Option<&str>) -> Result<Option<T>, ApiError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .filter(|v| !v.is_empty())
        .map(|v| v.parse::<T>().map_err(|e| ApiError::BadRequest(e.to_string())))
        .transpose()
}

/// `GET /api/tickets`
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<TicketPage>, ApiError> {
    let query = TicketQuery {
        status: parse_filter(query.status.as_deref())?,
        category: parse_filter(query.category.as_deref())?,
        priority: parse_filter(query.priority.as_deref())?,
        limit: query.limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE),
        offset: query.offset.unwrap_or(0),
    };
    Ok(Json(state.store.list(&query)?))
}

/// `GET /api/tickets/{ticket_number}`
pub async fn get_one(
    State(state): State<AppState>,
    Path(ticket_number): Path<String>,
) -> Result<Json<Ticket>, ApiError> {
    state
        .store
        .get(&ticket_number)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Ticket {ticket_number} not found")))
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: String,
}

/// `PATCH /api/tickets/{ticket_number}/status`
pub async fn update_status(
    State(state): State<AppState>,
    Path(ticket_number): Path<String>,
    Json(update): Json<StatusUpdate>,
) -> Result<Json<Value>, ApiError> {
    let status = TicketStatus::from_str(update.status.trim())
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let updated_at = state
        .store
        .update_status(&ticket_number, status, Utc::now())?
        .ok_or_else(|| ApiError::NotFound(format!("Ticket {ticket_number} not found")))?;
    Ok(Json(json!({
        "ticket_number": ticket_number,
        "status": status,
        "updated_at": updated_at,
    })))
}

/// `DELETE /api/tickets/{ticket_number}`
pub async fn remove(
    State(state): State<AppState>,
    Path(ticket_number): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if !state.store.delete(&ticket_number)? {
        return Err(ApiError::NotFound(format!("Ticket {ticket_number} not found")));
    }
    Ok(Json(json!({
        "message": "Ticket deleted successfully",
        "ticket_number": ticket_number,
    })))
}

#[derive(Debug, Deserialize)]
pub struct DashboardQuery {
    pub days: Option<u32>,
}

/// `GET /api/tickets/stats/dashboard`
pub async fn dashboard(
    State(state): State<AppState>,
    Query(query): Query<DashboardQuery>,
) -> Result<Json<DashboardStats>, ApiError> {
    let days = dashboard_days(&query)?;
    Ok(Json(state.store.dashboard(days, Utc::now())?))
}

/// Reporting window from `?days=`, defaulting to 30.
pub(super) fn dashboard_days(query: &DashboardQuery) -> Result<u32, ApiError> {
    let days = query.days.unwrap_or(DEFAULT_DASHBOARD_DAYS);
    if !(1..=MAX_DASHBOARD_DAYS).contains(&days) {
        return Err(ApiError::BadRequest(format!(
            "days must be between 1 and {MAX_DASHBOARD_DAYS}"
        )));
    }
    Ok(days)
}
