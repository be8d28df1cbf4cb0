//! # Instance Handlers
//!
//! Wizard-facing surface: instance creation with webhook binding, QR
//! refresh, one-shot state probes, the confirm (mark-connected) operation,
//! best-effort teardown, and the tenant's current status view.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::auth::{OperatorAuth, TenantExtension};
use crate::error::{ApiError, validation_error};
use crate::models::tenant_instance;
use crate::pairing::WizardParams;
use crate::provider::{ProviderError, QrCode};
use crate::server::AppState;

/// Request body for instance creation
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateInstanceRequest {
    /// Provider-side name for the new instance
    pub instance_name: String,
    /// Path on this service the provider should push events to
    pub webhook_path: String,
    /// Tenant contact address recorded on first contact
    #[serde(default)]
    pub email: Option<String>,
}

/// QR code response for creation and refresh
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct QrResponse {
    pub instance_name: String,
    /// Copyable pairing code, when the provider supplies one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pairing_code: Option<String>,
    /// Base64-encoded PNG of the scannable code
    pub qr_image_base64: String,
}

impl QrResponse {
    fn new(instance_name: &str, qr: QrCode) -> Self {
        Self {
            instance_name: instance_name.to_string(),
            pairing_code: qr.pairing_code,
            qr_image_base64: BASE64.encode(&qr.image),
        }
    }
}

/// One-shot connection-state probe response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct InstanceStateResponse {
    pub instance_name: String,
    /// Raw provider state string (`open`, `close`, `connecting`, ...)
    pub state: String,
    /// True iff the session is established
    pub connected: bool,
}

/// Request body for the mark-connected operation
#[derive(Debug, Deserialize, ToSchema)]
pub struct ConfirmRequest {
    pub instance_name: String,
    /// Phone-derived remote identifier, when the caller already knows it
    #[serde(default)]
    pub phone_number: Option<String>,
}

/// Best-effort teardown outcome
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TeardownResponse {
    pub success: bool,
    pub logout_ok: bool,
    pub delete_ok: bool,
}

/// Tenant's current connection record view
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct InstanceStatusResponse {
    pub instance_name: Option<String>,
    pub is_connected: bool,
    pub connected_at: Option<DateTime<Utc>>,
    pub disconnected_at: Option<DateTime<Utc>>,
    pub remote_jid: Option<String>,
    pub profile_name: Option<String>,
    pub profile_picture_url: Option<String>,
    pub profile_status: Option<String>,
    pub last_sync_at: Option<DateTime<Utc>>,
}

impl From<tenant_instance::Model> for InstanceStatusResponse {
    fn from(model: tenant_instance::Model) -> Self {
        Self {
            instance_name: model.instance_name,
            is_connected: model.is_connected,
            connected_at: model.connected_at.map(|ts| ts.with_timezone(&Utc)),
            disconnected_at: model.disconnected_at.map(|ts| ts.with_timezone(&Utc)),
            remote_jid: model.remote_jid,
            profile_name: model.profile_name,
            profile_picture_url: model.profile_picture_url,
            profile_status: model.profile_status,
            last_sync_at: model.last_sync_at.map(|ts| ts.with_timezone(&Utc)),
        }
    }
}

/// Create a provider instance for the tenant and return its QR code
#[utoipa::path(
    post,
    path = "/instances",
    security(("bearer_auth" = [])),
    params(crate::auth::TenantHeader),
    request_body = CreateInstanceRequest,
    responses(
        (status = 201, description = "Instance created, QR ready to scan", body = QrResponse),
        (status = 400, description = "Validation failed", body = ApiError),
        (status = 409, description = "Instance name already bound to another tenant", body = ApiError),
        (status = 502, description = "Provider unavailable", body = ApiError)
    ),
    tag = "instances"
)]
pub async fn create_instance(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    TenantExtension(tenant): TenantExtension,
    Json(request): Json<CreateInstanceRequest>,
) -> Result<(StatusCode, Json<QrResponse>), ApiError> {
    let params = WizardParams {
        instance_name: request.instance_name.clone(),
        webhook_path: request.webhook_path.clone(),
    };
    params.validate().map_err(|err| {
        let field = match err {
            crate::pairing::WizardValidationError::EmptyInstanceName => "instance_name",
            crate::pairing::WizardValidationError::EmptyWebhookPath => "webhook_path",
        };
        validation_error(
            "Validation failed",
            serde_json::json!({ field: err.to_string() }),
        )
    })?;

    let name = request.instance_name.trim();
    let records = state.tenant_instances();

    // One tenant per instance name; reject cross-tenant rebinding up front.
    if let Some(existing) = records.find_by_instance_name(name).await?
        && existing.user_id != tenant.0
    {
        return Err(ApiError::new(
            StatusCode::CONFLICT,
            "CONFLICT",
            &format!("instance '{}' is already bound to another tenant", name),
        ));
    }

    records
        .ensure_record(&tenant.0, request.email.as_deref().unwrap_or(""))
        .await?;

    let qr = state
        .provider
        .create_instance(name, request.webhook_path.trim())
        .await?;

    records.bind_instance(&tenant.0, name).await?;

    info!(user_id = %tenant.0, instance_name = %name, "Instance created and bound");

    Ok((StatusCode::CREATED, Json(QrResponse::new(name, qr))))
}

/// Fetch a fresh QR code for an existing instance
#[utoipa::path(
    get,
    path = "/instances/{name}/qr",
    security(("bearer_auth" = [])),
    params(("name" = String, Path, description = "Instance name")),
    responses(
        (status = 200, description = "Fresh QR code", body = QrResponse),
        (status = 404, description = "Instance not found", body = ApiError),
        (status = 502, description = "Provider unavailable", body = ApiError)
    ),
    tag = "instances"
)]
pub async fn refresh_qr(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Path(name): Path<String>,
) -> Result<Json<QrResponse>, ApiError> {
    let qr = state.provider.fetch_qr_code(&name).await?;
    Ok(Json(QrResponse::new(&name, qr)))
}

/// One-shot probe of an instance's connection state
#[utoipa::path(
    get,
    path = "/instances/{name}/state",
    security(("bearer_auth" = [])),
    params(("name" = String, Path, description = "Instance name")),
    responses(
        (status = 200, description = "Current provider-reported state", body = InstanceStateResponse),
        (status = 404, description = "Instance not found", body = ApiError),
        (status = 502, description = "Provider unavailable", body = ApiError)
    ),
    tag = "instances"
)]
pub async fn probe_state(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Path(name): Path<String>,
) -> Result<Json<InstanceStateResponse>, ApiError> {
    let instance_state = state.provider.fetch_connection_state(&name).await?;

    Ok(Json(InstanceStateResponse {
        instance_name: name,
        connected: instance_state.is_open(),
        state: instance_state.as_str().to_string(),
    }))
}

/// Mark the tenant's connection as established
///
/// The wizard's confirm step and the webhook handler both route into the
/// same repository operation, so confirmation semantics cannot drift by
/// caller.
#[utoipa::path(
    post,
    path = "/instances/confirm",
    security(("bearer_auth" = [])),
    params(crate::auth::TenantHeader),
    request_body = ConfirmRequest,
    responses(
        (status = 200, description = "Connection recorded", body = InstanceStatusResponse),
        (status = 400, description = "Validation failed", body = ApiError),
        (status = 404, description = "Tenant record not found", body = ApiError)
    ),
    tag = "instances"
)]
pub async fn confirm_connection(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    TenantExtension(tenant): TenantExtension,
    Json(request): Json<ConfirmRequest>,
) -> Result<Json<InstanceStatusResponse>, ApiError> {
    if request.instance_name.trim().is_empty() {
        return Err(validation_error(
            "Validation failed",
            serde_json::json!({ "instance_name": "must not be empty" }),
        ));
    }

    let records = state.tenant_instances();
    if records.find_by_user(&tenant.0).await?.is_none() {
        return Err(ApiError::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "Tenant record not found",
        ));
    }

    let updated = records
        .mark_connected(
            &tenant.0,
            request.instance_name.trim(),
            request.phone_number.clone(),
        )
        .await?;

    info!(
        user_id = %tenant.0,
        instance_name = %request.instance_name,
        "Connection confirmed via wizard"
    );

    Ok(Json(updated.into()))
}

/// Tear down the tenant's instance and clear the binding
#[utoipa::path(
    delete,
    path = "/instances/{name}",
    security(("bearer_auth" = [])),
    params(
        crate::auth::TenantHeader,
        ("name" = String, Path, description = "Instance name")
    ),
    responses(
        (status = 200, description = "Teardown outcome", body = TeardownResponse),
        (status = 404, description = "Tenant has no such instance binding", body = ApiError),
        (status = 502, description = "Provider unreachable, binding kept", body = ApiError)
    ),
    tag = "instances"
)]
pub async fn teardown_instance(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    TenantExtension(tenant): TenantExtension,
    Path(name): Path<String>,
) -> Result<Json<TeardownResponse>, ApiError> {
    let records = state.tenant_instances();
    let record = records.find_by_user(&tenant.0).await?;
    let bound = record
        .as_ref()
        .and_then(|r| r.instance_name.as_deref())
        .is_some_and(|bound_name| bound_name == name);
    if !bound {
        return Err(ApiError::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            &format!("no instance '{}' bound to this tenant", name),
        ));
    }

    let (logout_ok, delete_ok) = match state.provider.logout_and_delete(&name).await {
        Ok(outcome) => (outcome.logout_ok, outcome.delete_ok),
        // Already gone provider-side: the teardown goal is met.
        Err(ProviderError::InstanceNotFound { .. }) => {
            warn!(instance_name = %name, "Instance already absent at provider");
            (false, true)
        }
        // Nothing was torn down; keep the binding truthful and let the
        // caller retry.
        Err(err) => return Err(err.into()),
    };

    records.clear_binding(&tenant.0, Utc::now()).await?;

    info!(
        user_id = %tenant.0,
        instance_name = %name,
        logout_ok,
        delete_ok,
        "Instance torn down and binding cleared"
    );

    Ok(Json(TeardownResponse {
        success: true,
        logout_ok,
        delete_ok,
    }))
}

/// Current connection record view for the tenant
#[utoipa::path(
    get,
    path = "/instances/status",
    security(("bearer_auth" = [])),
    params(crate::auth::TenantHeader),
    responses(
        (status = 200, description = "Current record", body = InstanceStatusResponse),
        (status = 404, description = "Tenant record not found", body = ApiError)
    ),
    tag = "instances"
)]
pub async fn instance_status(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    TenantExtension(tenant): TenantExtension,
) -> Result<Json<InstanceStatusResponse>, ApiError> {
    let record = state
        .tenant_instances()
        .find_by_user(&tenant.0)
        .await?
        .ok_or_else(|| {
            ApiError::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                "Tenant record not found",
            )
        })?;

    Ok(Json(record.into()))
}
