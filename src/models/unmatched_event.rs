//! Unmatched webhook event entity model
//!
//! Review queue for connection-update events that resolved to no tenant
//! record. Events are never auto-bound to a guessed tenant; an operator
//! inspects this table instead.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Webhook event awaiting manual review
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "unmatched_events")]
pub struct Model {
    /// Unique identifier (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Instance name the provider reported
    pub instance_name: String,

    /// Connection status the provider reported
    pub status: String,

    /// Full raw event payload
    #[sea_orm(column_type = "JsonBinary")]
    pub payload: Option<JsonValue>,

    /// When the event was received
    pub received_at: DateTimeWithTimeZone,

    /// Whether an operator has reviewed this entry
    pub reviewed: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
