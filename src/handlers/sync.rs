//! # Sync Trigger Handlers
//!
//! Operator-facing manual trigger for the reconciliation job and the
//! job-status read. Failures never escape as exceptions: the trigger
//! responds with a structured `{success:false, error, timestamp}` body so
//! "never ran" and "ran and failed" stay distinguishable via `/sync/status`.

use axum::{extract::State, response::Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{error, info};
use utoipa::ToSchema;

use crate::auth::OperatorAuth;
use crate::error::ApiError;
use crate::models::sync_status;
use crate::reconcile::{ReconcileSummary, RunTrigger};
use crate::server::AppState;

/// Optional audit metadata accompanying a manual trigger
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct SyncRunRequest {
    /// True when fired by an external scheduler rather than a human
    #[serde(default)]
    pub automatic: bool,
    /// Free-form origin tag, audit logging only
    #[serde(default)]
    pub source: Option<String>,
}

/// Manual trigger response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SyncRunResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ReconcileSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// One persisted job-status entry
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SyncStatusEntry {
    pub recorded_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<JsonValue>,
}

impl From<sync_status::Model> for SyncStatusEntry {
    fn from(model: sync_status::Model) -> Self {
        Self {
            recorded_at: model.recorded_at.with_timezone(&Utc),
            message: model.message,
            payload: model.payload,
        }
    }
}

/// Job-status response: last success and last failure, independently
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SyncStatusResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<SyncStatusEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync_error: Option<SyncStatusEntry>,
}

/// Trigger a reconciliation pass on demand
#[utoipa::path(
    post,
    path = "/sync/run",
    security(("bearer_auth" = [])),
    request_body(content = Option<SyncRunRequest>, content_type = "application/json"),
    responses(
        (status = 200, description = "Pass outcome, success flag inside the body", body = SyncRunResponse),
        (status = 401, description = "Missing or invalid operator token", body = ApiError)
    ),
    tag = "sync"
)]
pub async fn run_sync(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    body: Option<Json<SyncRunRequest>>,
) -> Json<SyncRunResponse> {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    let trigger = RunTrigger {
        automatic: request.automatic,
        source: request.source.unwrap_or_else(|| "manual".to_string()),
    };

    info!(
        automatic = trigger.automatic,
        source = %trigger.source,
        "Manual reconciliation trigger received"
    );

    match state.reconcile_job().run_once(trigger).await {
        Ok(summary) => Json(SyncRunResponse {
            success: true,
            message: Some(summary.message()),
            result: Some(summary),
            error: None,
            timestamp: Utc::now(),
        }),
        Err(err) => {
            error!(error = %err, "Manual reconciliation pass failed");
            Json(SyncRunResponse {
                success: false,
                message: None,
                result: None,
                error: Some(err.to_string()),
                timestamp: Utc::now(),
            })
        }
    }
}

/// Read the persisted reconciliation job status
#[utoipa::path(
    get,
    path = "/sync/status",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Last success and last failure entries", body = SyncStatusResponse),
        (status = 401, description = "Missing or invalid operator token", body = ApiError)
    ),
    tag = "sync"
)]
pub async fn sync_status(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
) -> Result<Json<SyncStatusResponse>, ApiError> {
    let (last_sync, last_sync_error) = state.sync_status().latest().await?;

    Ok(Json(SyncStatusResponse {
        last_sync: last_sync.map(Into::into),
        last_sync_error: last_sync_error.map(Into::into),
    }))
}
