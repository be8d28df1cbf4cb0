//! Migration to create the tenant_instances table.
//!
//! This migration creates the tenant_instances table which stores the
//! per-tenant binding to an Evolution messaging instance together with the
//! last reconciled connection state and provider-reported profile metadata.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(TenantInstances::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TenantInstances::UserId)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(TenantInstances::Email).text().not_null())
                    .col(ColumnDef::new(TenantInstances::InstanceName).text().null())
                    .col(
                        ColumnDef::new(TenantInstances::IsConnected)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(TenantInstances::ConnectedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TenantInstances::DisconnectedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(TenantInstances::RemoteJid).text().null())
                    .col(ColumnDef::new(TenantInstances::ProfileName).text().null())
                    .col(
                        ColumnDef::new(TenantInstances::ProfilePictureUrl)
                            .text()
                            .null(),
                    )
                    .col(ColumnDef::new(TenantInstances::ProfileStatus).text().null())
                    .col(
                        ColumnDef::new(TenantInstances::ProviderInstanceId)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TenantInstances::ProviderApiKey)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TenantInstances::ProviderIntegration)
                            .json_binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TenantInstances::ProviderRawSnapshot)
                            .json_binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TenantInstances::LastSyncAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TenantInstances::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(TenantInstances::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // A provider instance may be bound to at most one tenant at a time.
        manager
            .create_index(
                Index::create()
                    .name("idx_tenant_instances_instance_name")
                    .table(TenantInstances::Table)
                    .col(TenantInstances::InstanceName)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_tenant_instances_instance_name")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(TenantInstances::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum TenantInstances {
    Table,
    UserId,
    Email,
    InstanceName,
    IsConnected,
    ConnectedAt,
    DisconnectedAt,
    RemoteJid,
    ProfileName,
    ProfilePictureUrl,
    ProfileStatus,
    ProviderInstanceId,
    ProviderApiKey,
    ProviderIntegration,
    ProviderRawSnapshot,
    LastSyncAt,
    CreatedAt,
    UpdatedAt,
}
