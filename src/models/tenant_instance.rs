//! Tenant instance entity model
//!
//! SeaORM entity for the tenant_instances table: one row per tenant, holding
//! the binding to an Evolution messaging instance plus the last reconciled
//! connection state and provider-reported profile metadata.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Per-tenant messaging-instance binding and connection state
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "tenant_instances")]
pub struct Model {
    /// Tenant identifier (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: Uuid,

    /// Tenant contact address, kept for operator diagnostics
    pub email: String,

    /// Name of the provider-side instance bound to this tenant; null until
    /// the connection wizard creates one, cleared on teardown
    pub instance_name: Option<String>,

    /// True iff the provider last reported this instance's session as open
    pub is_connected: bool,

    /// Timestamp of the last observed transition into the connected state
    pub connected_at: Option<DateTimeWithTimeZone>,

    /// Timestamp of the last observed transition out of the connected state
    pub disconnected_at: Option<DateTimeWithTimeZone>,

    /// WhatsApp account identifier bound to the session once connected
    pub remote_jid: Option<String>,

    /// Cached provider-reported profile display name
    pub profile_name: Option<String>,

    /// Cached provider-reported profile picture URL
    pub profile_picture_url: Option<String>,

    /// Cached provider-reported profile status line
    pub profile_status: Option<String>,

    /// Provider-side instance id, passthrough for audit
    pub provider_instance_id: Option<String>,

    /// Per-instance API key reported by the provider, passthrough for audit
    pub provider_api_key: Option<String>,

    /// Provider integration object, passthrough for audit
    #[sea_orm(column_type = "JsonBinary")]
    pub provider_integration: Option<JsonValue>,

    /// Full raw provider snapshot from the last reconciliation touch
    #[sea_orm(column_type = "JsonBinary")]
    pub provider_raw_snapshot: Option<JsonValue>,

    /// Timestamp of the most recent reconciliation touch, independent of
    /// connection-state changes
    pub last_sync_at: Option<DateTimeWithTimeZone>,

    /// Timestamp when the record was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the record was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
