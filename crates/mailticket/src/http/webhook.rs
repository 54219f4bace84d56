//! Provider notification endpoint.

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{ApiError, AppState};
use crate::dispatch::DispatchOutcome;
use crate::sanitize;
use crate::webhook::parse_batch;

#[derive(Debug, Deserialize)]
pub struct WebhookQuery {
    #[serde(rename = "validationToken")]
    pub validation_token: Option<String>,
}

/// Batch acknowledgment body.
#[derive(Debug, Default, Serialize)]
pub struct WebhookAck {
    pub status: &'static str,
    pub received: usize,
    pub scheduled: usize,
    /// Entries that failed parsing or authentication.
    pub discarded: usize,
    pub duplicates: usize,
    /// Authentic entries that need no work (other change types).
    pub ignored: usize,
    /// Entries lost to a full queue or shutdown.
    pub dropped: usize,
}

/// `POST /api/webhooks/graph-notifications`
///
/// Echoes the validation token when present. Otherwise validates each entry,
/// hands authentic `created` entries to the dispatcher and answers 202 without
/// waiting for any processing.
pub async fn graph_notifications(
    State(state): State<AppState>,
    Query(query): Query<WebhookQuery>,
    body: Bytes,
) -> Response {
    if let Some(token) = query.validation_token {
        info!("Subscription validation handshake");
        return (StatusCode::OK, [(header::CONTENT_TYPE, "text/plain")], token).into_response();
    }

    let batch = match parse_batch(&body) {
        Ok(batch) => batch,
        Err(e) => {
            warn!(error = %e, "Rejected notification body");
            return ApiError::BadRequest(e.to_string()).into_response();
        }
    };

    let mut ack = WebhookAck {
        status: "accepted",
        received: batch.received(),
        discarded: batch.rejected.len(),
        ..WebhookAck::default()
    };
    for rejected in &batch.rejected {
        warn!(error = %rejected, "Discarded notification entry");
    }

    for notification in &batch.notifications {
        let subscription = sanitize::short_id(&notification.subscription_id);
        if let Err(e) = state.validator.validate(notification) {
            warn!(subscription = %subscription, error = %e, "Discarded notification");
            ack.discarded += 1;
            continue;
        }
        if !notification.is_created() {
            debug!(change_type = %notification.change_type, "Ignoring notification");
            ack.ignored += 1;
            continue;
        }
        match state.dispatcher.dispatch(&notification.resource_id) {
            DispatchOutcome::Scheduled => ack.scheduled += 1,
            outcome if outcome.is_duplicate() => ack.duplicates += 1,
            _ => ack.dropped += 1,
        }
    }

    info!(
        received = ack.received,
        scheduled = ack.scheduled,
        discarded = ack.discarded,
        duplicates = ack.duplicates,
        "Notification batch acknowledged"
    );
    (StatusCode::ACCEPTED, Json(ack)).into_response()
}
