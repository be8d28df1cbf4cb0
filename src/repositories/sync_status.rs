//! Sync status repository.
//!
//! Keyed upserts for the reconciliation job's `last_sync` and
//! `last_sync_error` rows. Success and failure are stored independently so
//! staleness and failure remain distinguishable.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{DatabaseConnection, EntityTrait, Set};
use serde_json::Value as JsonValue;
use std::sync::Arc;

use crate::models::sync_status::{self, Entity as SyncStatus, KEY_LAST_SYNC, KEY_LAST_SYNC_ERROR};

use super::to_db_time;

/// Repository for reconciliation job-status rows.
#[derive(Debug, Clone)]
pub struct SyncStatusRepository {
    /// Database connection pool
    pub db: Arc<DatabaseConnection>,
}

impl SyncStatusRepository {
    /// Creates a new SyncStatusRepository instance.
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Records a successful reconciliation run.
    pub async fn record_success(
        &self,
        message: &str,
        payload: JsonValue,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.upsert(KEY_LAST_SYNC, Some(message.to_string()), Some(payload), now)
            .await
    }

    /// Records a failed reconciliation run.
    pub async fn record_failure(&self, error: &str, now: DateTime<Utc>) -> Result<()> {
        self.upsert(KEY_LAST_SYNC_ERROR, Some(error.to_string()), None, now)
            .await
    }

    /// Returns the last success and last failure rows, either of which may
    /// be absent.
    pub async fn latest(
        &self,
    ) -> Result<(Option<sync_status::Model>, Option<sync_status::Model>)> {
        let success = self.get(KEY_LAST_SYNC).await?;
        let failure = self.get(KEY_LAST_SYNC_ERROR).await?;
        Ok((success, failure))
    }

    /// Fetches a single job-status row by key.
    pub async fn get(&self, key: &str) -> Result<Option<sync_status::Model>> {
        Ok(SyncStatus::find_by_id(key.to_string()).one(&*self.db).await?)
    }

    async fn upsert(
        &self,
        key: &str,
        message: Option<String>,
        payload: Option<JsonValue>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let active = sync_status::ActiveModel {
            key: Set(key.to_string()),
            recorded_at: Set(to_db_time(now)),
            message: Set(message),
            payload: Set(payload),
        };

        SyncStatus::insert(active)
            .on_conflict(
                OnConflict::column(sync_status::Column::Key)
                    .update_columns([
                        sync_status::Column::RecordedAt,
                        sync_status::Column::Message,
                        sync_status::Column::Payload,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&*self.db)
            .await?;

        Ok(())
    }
}
