//! Tenant instance repository.
//!
//! Encapsulates reads and the single-statement status upsert over the
//! tenant_instances table. Every status write goes through
//! [`TenantInstanceRepository::apply_status`] so the connected flag and its
//! paired timestamps are always written together, and every write publishes
//! a change notification on the [`StatusFeed`].

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::feed::{RecordChange, StatusFeed};
use crate::models::tenant_instance::{self, Entity as TenantInstance};
use crate::pairing::{ConnectionConfirmer, ConnectionView, StatusFetcher};
use crate::provider::EventData;
use crate::reconcile::StatusPatch;

use super::to_db_time;

/// Repository for tenant instance records.
#[derive(Debug, Clone)]
pub struct TenantInstanceRepository {
    /// Database connection pool
    pub db: Arc<DatabaseConnection>,
    feed: StatusFeed,
}

impl TenantInstanceRepository {
    /// Creates a new repository publishing change notifications to `feed`.
    pub fn new(db: Arc<DatabaseConnection>, feed: StatusFeed) -> Self {
        Self { db, feed }
    }

    /// Finds a tenant's record by id.
    pub async fn find_by_user(&self, user_id: &Uuid) -> Result<Option<tenant_instance::Model>> {
        Ok(TenantInstance::find_by_id(*user_id).one(&*self.db).await?)
    }

    /// Finds the record bound to the given provider instance name, if any.
    pub async fn find_by_instance_name(
        &self,
        instance_name: &str,
    ) -> Result<Option<tenant_instance::Model>> {
        Ok(TenantInstance::find()
            .filter(tenant_instance::Column::InstanceName.eq(instance_name))
            .one(&*self.db)
            .await?)
    }

    /// Lists every record with an instance binding, the reconciliation
    /// pass's working set.
    pub async fn find_bound(&self) -> Result<Vec<tenant_instance::Model>> {
        Ok(TenantInstance::find()
            .filter(tenant_instance::Column::InstanceName.is_not_null())
            .order_by_asc(tenant_instance::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    /// Fetches the tenant's record, creating a fresh unbound one on first
    /// contact.
    pub async fn ensure_record(
        &self,
        user_id: &Uuid,
        email: &str,
    ) -> Result<tenant_instance::Model> {
        if let Some(existing) = self.find_by_user(user_id).await? {
            return Ok(existing);
        }

        let now = to_db_time(Utc::now());
        let active = tenant_instance::ActiveModel {
            user_id: Set(*user_id),
            email: Set(email.to_string()),
            instance_name: Set(None),
            is_connected: Set(false),
            connected_at: Set(None),
            disconnected_at: Set(None),
            remote_jid: Set(None),
            profile_name: Set(None),
            profile_picture_url: Set(None),
            profile_status: Set(None),
            provider_instance_id: Set(None),
            provider_api_key: Set(None),
            provider_integration: Set(None),
            provider_raw_snapshot: Set(None),
            last_sync_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };
        active.insert(&*self.db).await?;

        self.find_by_user(user_id)
            .await?
            .ok_or_else(|| anyhow!("tenant record not persisted"))
    }

    /// Records the instance name the wizard just created for this tenant.
    pub async fn bind_instance(
        &self,
        user_id: &Uuid,
        instance_name: &str,
    ) -> Result<tenant_instance::Model> {
        let active = tenant_instance::ActiveModel {
            user_id: Set(*user_id),
            instance_name: Set(Some(instance_name.to_string())),
            is_connected: Set(false),
            updated_at: Set(to_db_time(Utc::now())),
            ..Default::default()
        };

        let model = active.update(&*self.db).await?;
        Ok(model)
    }

    /// Applies a computed status patch as one update statement and publishes
    /// the resulting change.
    ///
    /// Concurrent writers race last-write-wins here; both derive their patch
    /// from provider-reported truth, so the losing write is equivalent.
    pub async fn apply_status(
        &self,
        user_id: &Uuid,
        patch: &StatusPatch,
    ) -> Result<tenant_instance::Model> {
        let active = tenant_instance::ActiveModel {
            user_id: Set(*user_id),
            instance_name: Set(Some(patch.instance_name.clone())),
            is_connected: Set(patch.is_connected),
            connected_at: Set(patch.connected_at.map(to_db_time)),
            disconnected_at: Set(patch.disconnected_at.map(to_db_time)),
            remote_jid: Set(patch.remote_jid.clone()),
            profile_name: Set(patch.profile_name.clone()),
            profile_picture_url: Set(patch.profile_picture_url.clone()),
            profile_status: Set(patch.profile_status.clone()),
            provider_instance_id: Set(patch.provider_instance_id.clone()),
            provider_api_key: Set(patch.provider_api_key.clone()),
            provider_integration: Set(patch.provider_integration.clone()),
            provider_raw_snapshot: Set(patch.provider_raw_snapshot.clone()),
            last_sync_at: Set(Some(to_db_time(patch.last_sync_at))),
            updated_at: Set(to_db_time(patch.last_sync_at)),
            ..Default::default()
        };

        let model = active.update(&*self.db).await?;

        self.feed.publish(RecordChange {
            user_id: *user_id,
            instance_name: model.instance_name.clone(),
            is_connected: model.is_connected,
            remote_jid: model.remote_jid.clone(),
            changed_at: patch.last_sync_at,
        });

        Ok(model)
    }

    /// The mark-connected operation: record an established session for the
    /// tenant with identical semantics regardless of caller (wizard confirm
    /// or webhook).
    pub async fn mark_connected(
        &self,
        user_id: &Uuid,
        instance_name: &str,
        remote_jid: Option<String>,
    ) -> Result<tenant_instance::Model> {
        let record = self
            .find_by_user(user_id)
            .await?
            .ok_or_else(|| anyhow!("tenant record '{}' not found", user_id))?;

        let data = EventData {
            remote_jid,
            ..EventData::default()
        };
        let patch = StatusPatch::connected_event(&record, instance_name, &data, None, Utc::now());
        self.apply_status(user_id, &patch).await
    }

    /// Clears the tenant's instance binding after provider teardown.
    ///
    /// Instance fields are nulled and the record marked disconnected; the
    /// tenant row itself is never deleted here.
    pub async fn clear_binding(
        &self,
        user_id: &Uuid,
        now: DateTime<Utc>,
    ) -> Result<tenant_instance::Model> {
        let existing = self
            .find_by_user(user_id)
            .await?
            .ok_or_else(|| anyhow!("tenant record '{}' not found", user_id))?;

        let disconnected_at = if existing.is_connected {
            Some(to_db_time(now))
        } else {
            existing.disconnected_at
        };

        let active = tenant_instance::ActiveModel {
            user_id: Set(*user_id),
            instance_name: Set(None),
            is_connected: Set(false),
            connected_at: Set(None),
            disconnected_at: Set(disconnected_at),
            remote_jid: Set(None),
            provider_instance_id: Set(None),
            provider_api_key: Set(None),
            provider_integration: Set(None),
            provider_raw_snapshot: Set(None),
            updated_at: Set(to_db_time(now)),
            ..Default::default()
        };

        let model = active.update(&*self.db).await?;

        self.feed.publish(RecordChange {
            user_id: *user_id,
            instance_name: None,
            is_connected: false,
            remote_jid: None,
            changed_at: now,
        });

        Ok(model)
    }
}

#[async_trait]
impl ConnectionConfirmer for TenantInstanceRepository {
    async fn mark_connected(
        &self,
        user_id: Uuid,
        instance_name: &str,
        remote_jid: Option<String>,
    ) -> Result<()> {
        TenantInstanceRepository::mark_connected(self, &user_id, instance_name, remote_jid)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl StatusFetcher for TenantInstanceRepository {
    async fn fetch_status(&self, user_id: Uuid) -> Result<ConnectionView> {
        let record = self.find_by_user(&user_id).await?;

        Ok(match record {
            Some(record) => ConnectionView {
                is_connected: record.is_connected,
                instance_name: record.instance_name,
                remote_jid: record.remote_jid,
                checked_at: Some(Utc::now()),
            },
            None => ConnectionView {
                checked_at: Some(Utc::now()),
                ..ConnectionView::default()
            },
        })
    }
}
