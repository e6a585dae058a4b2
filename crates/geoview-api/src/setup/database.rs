//! Database pool setup

use std::time::Duration;

use anyhow::{Context, Result};
use geoview_core::AppConfig;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Connect the pool and verify the database answers.
pub async fn setup_database(config: &AppConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(config.db_timeout_seconds))
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .context("Database connectivity check failed")?;

    tracing::info!(
        max_connections = config.db_max_connections,
        "Database pool ready"
    );
    Ok(pool)
}
