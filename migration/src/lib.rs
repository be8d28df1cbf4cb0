//! Database migrations for the evosync service.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2025_06_20_000001_create_tenant_instances;
mod m2025_06_20_000002_create_sync_status;
mod m2025_06_20_000003_create_unmatched_events;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_06_20_000001_create_tenant_instances::Migration),
            Box::new(m2025_06_20_000002_create_sync_status::Migration),
            Box::new(m2025_06_20_000003_create_unmatched_events::Migration),
        ]
    }
}
