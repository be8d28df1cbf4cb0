//! Migration to create the unmatched_events table.
//!
//! Connection-update webhooks that resolve to no tenant record are queued
//! here for manual review instead of being bound to a guessed tenant.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(UnmatchedEvents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(UnmatchedEvents::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(UnmatchedEvents::InstanceName)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(UnmatchedEvents::Status).text().not_null())
                    .col(
                        ColumnDef::new(UnmatchedEvents::Payload)
                            .json_binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(UnmatchedEvents::ReceivedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(UnmatchedEvents::Reviewed)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_unmatched_events_instance_name")
                    .table(UnmatchedEvents::Table)
                    .col(UnmatchedEvents::InstanceName)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_unmatched_events_instance_name")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(UnmatchedEvents::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum UnmatchedEvents {
    Table,
    Id,
    InstanceName,
    Status,
    Payload,
    ReceivedAt,
    Reviewed,
}
