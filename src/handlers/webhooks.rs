//! # Webhook Handler
//!
//! Receives connection-state events pushed by the Evolution API. Only
//! `CONNECTION_UPDATE` events with an established-session status mutate
//! state; everything else is acknowledged and dropped. Resolution is by
//! exact instance-name match — events matching no record are queued for
//! manual review and still acknowledged, so the provider never
//! retry-storms us over state we cannot attribute.

use axum::{extract::State, http::StatusCode, response::Json};
use chrono::Utc;
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, error, info};
use utoipa::ToSchema;

use crate::error::{ApiError, validation_error};
use crate::provider::{ConnectionEvent, EVENT_CONNECTION_UPDATE, is_connected_status};
use crate::reconcile::StatusPatch;
use crate::server::AppState;

/// Acknowledgement returned to the provider
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookAck {
    /// Whether the event was accepted
    pub success: bool,
    /// Echo of the event name
    pub event: String,
    /// Echo of the instance name
    pub instance: String,
}

/// Accept a pushed provider event
#[utoipa::path(
    post,
    path = "/webhooks/evolution",
    request_body(content = JsonValue, description = "Provider event payload", content_type = "application/json"),
    responses(
        (status = 200, description = "Event acknowledged", body = WebhookAck),
        (status = 400, description = "Malformed event payload", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "webhooks"
)]
pub async fn receive_event(
    State(state): State<AppState>,
    Json(payload): Json<JsonValue>,
) -> Result<(StatusCode, Json<WebhookAck>), ApiError> {
    let event: ConnectionEvent = serde_json::from_value(payload.clone()).map_err(|err| {
        validation_error(
            "Malformed provider event",
            serde_json::json!({ "body": err.to_string() }),
        )
    })?;

    let instance_name = event.instance.instance_name.clone();
    let ack = WebhookAck {
        success: true,
        event: event.event.clone(),
        instance: instance_name.clone(),
    };

    counter!("webhook_events_received_total").increment(1);

    if event.event != EVENT_CONNECTION_UPDATE {
        debug!(
            event = %event.event,
            instance_name = %instance_name,
            "Ignoring non-connection event"
        );
        return Ok((StatusCode::OK, Json(ack)));
    }

    let status = event.instance.status.as_deref().unwrap_or("");
    if !is_connected_status(status) {
        // Disconnects are discovered by the reconciliation pass; the
        // webhook only ever confirms pairing.
        debug!(
            instance_name = %instance_name,
            status = %status,
            "Connection update without established session; no write"
        );
        return Ok((StatusCode::OK, Json(ack)));
    }

    let records = state.tenant_instances();
    match records.find_by_instance_name(&instance_name).await? {
        Some(record) => {
            let patch = StatusPatch::connected_event(
                &record,
                &instance_name,
                &event.data,
                Some(payload),
                Utc::now(),
            );
            records.apply_status(&record.user_id, &patch).await?;

            counter!("webhook_connections_applied_total").increment(1);
            info!(
                instance_name = %instance_name,
                user_id = %record.user_id,
                remote_jid = ?event.data.remote_jid,
                "Connection confirmed via webhook"
            );
        }
        None => {
            // Acknowledged regardless: a 5xx would only make the provider
            // replay an event we still could not attribute.
            counter!("webhook_events_unresolved_total").increment(1);
            error!(
                instance_name = %instance_name,
                status = %status,
                "Connection event matched no tenant record; queued for review"
            );

            if let Err(err) = state
                .unmatched_events()
                .record(&instance_name, status, Some(payload), Utc::now())
                .await
            {
                error!(error = %err, "Failed to queue unmatched event");
            }
        }
    }

    Ok((StatusCode::OK, Json(ack)))
}
