//! Unmatched event repository.
//!
//! Queue of connection-update events that matched no tenant record,
//! retained for operator review.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::unmatched_event::{self, Entity as UnmatchedEvent};

use super::to_db_time;

/// Repository for the unmatched webhook event review queue.
#[derive(Debug, Clone)]
pub struct UnmatchedEventRepository {
    /// Database connection pool
    pub db: Arc<DatabaseConnection>,
}

impl UnmatchedEventRepository {
    /// Creates a new UnmatchedEventRepository instance.
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Queues an event for manual review.
    pub async fn record(
        &self,
        instance_name: &str,
        status: &str,
        payload: Option<JsonValue>,
        received_at: DateTime<Utc>,
    ) -> Result<unmatched_event::Model> {
        let id = Uuid::new_v4();
        let active = unmatched_event::ActiveModel {
            id: Set(id),
            instance_name: Set(instance_name.to_string()),
            status: Set(status.to_string()),
            payload: Set(payload),
            received_at: Set(to_db_time(received_at)),
            reviewed: Set(false),
        };
        active.insert(&*self.db).await?;

        UnmatchedEvent::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| anyhow::anyhow!("unmatched event not persisted"))
    }

    /// Lists queued events an operator has not yet reviewed.
    pub async fn list_unreviewed(&self, limit: u64) -> Result<Vec<unmatched_event::Model>> {
        Ok(UnmatchedEvent::find()
            .filter(unmatched_event::Column::Reviewed.eq(false))
            .order_by_asc(unmatched_event::Column::ReceivedAt)
            .limit(limit)
            .all(&*self.db)
            .await?)
    }

    /// Count of events awaiting review.
    pub async fn count_unreviewed(&self) -> Result<u64> {
        Ok(UnmatchedEvent::find()
            .filter(unmatched_event::Column::Reviewed.eq(false))
            .count(&*self.db)
            .await?)
    }
}
