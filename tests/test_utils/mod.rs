//! Test utilities for database and application testing.
//!
//! Sets up in-memory SQLite databases with migrations applied and inserts
//! fixture tenant records.

use anyhow::Result;
use chrono::{DateTime, Utc};
use evosync::migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Statement, Value};
use std::sync::Arc;
use uuid::Uuid;

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

/// Arc-wrapped variant of [`setup_test_db`].
#[allow(dead_code)]
pub async fn setup_test_db_arc() -> Result<Arc<DatabaseConnection>> {
    let db = setup_test_db().await?;
    Ok(Arc::new(db))
}

/// Inserts a tenant record directly, optionally bound to an instance.
#[allow(dead_code)]
pub async fn insert_tenant_instance(
    db: &DatabaseConnection,
    user_id: Uuid,
    email: &str,
    instance_name: Option<&str>,
    is_connected: bool,
) -> Result<()> {
    let backend = db.get_database_backend();
    let now = Utc::now().to_rfc3339();

    db.execute(Statement::from_sql_and_values(
        backend,
        "INSERT INTO tenant_instances \
         (user_id, email, instance_name, is_connected, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
        vec![
            Value::from(user_id),
            Value::from(email),
            match instance_name {
                Some(name) => Value::from(name),
                None => Value::String(None),
            },
            Value::from(is_connected),
            Value::from(now.clone()),
            Value::from(now),
        ],
    ))
    .await?;

    Ok(())
}

/// Inserts a tenant record already marked connected at `connected_at`.
#[allow(dead_code)]
pub async fn insert_connected_tenant_instance(
    db: &DatabaseConnection,
    user_id: Uuid,
    email: &str,
    instance_name: &str,
    connected_at: DateTime<Utc>,
) -> Result<()> {
    let backend = db.get_database_backend();
    let now = Utc::now().to_rfc3339();

    db.execute(Statement::from_sql_and_values(
        backend,
        "INSERT INTO tenant_instances \
         (user_id, email, instance_name, is_connected, connected_at, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        vec![
            Value::from(user_id),
            Value::from(email),
            Value::from(instance_name),
            Value::from(true),
            Value::from(connected_at.to_rfc3339()),
            Value::from(now.clone()),
            Value::from(now),
        ],
    ))
    .await?;

    Ok(())
}
