//! Sync status entity model
//!
//! Keyed job-status rows for the reconciliation job. `last_sync` and
//! `last_sync_error` are independent rows so a caller can distinguish
//! "never ran" from "last run failed".

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;

/// Key of the most recent successful reconciliation entry.
pub const KEY_LAST_SYNC: &str = "last_sync";

/// Key of the most recent failed reconciliation entry.
pub const KEY_LAST_SYNC_ERROR: &str = "last_sync_error";

/// Keyed reconciliation job-status entry
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "sync_status")]
pub struct Model {
    /// Entry key (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub key: String,

    /// When this entry was last written
    pub recorded_at: DateTimeWithTimeZone,

    /// Human-readable summary or error message
    pub message: Option<String>,

    /// Structured result payload of the run
    #[sea_orm(column_type = "JsonBinary")]
    pub payload: Option<JsonValue>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
