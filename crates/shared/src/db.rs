//! Database connection pooling utilities

use crate::config::DatabaseConfig;
use crate::error::Result;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

/// Type alias for the database pool
pub type DbPool = PgPool;

/// Create a new database connection pool
///
/// # Errors
///
/// Returns an error if the pool cannot be created or if the connection fails
pub async fn create_pool(config: &DatabaseConfig) -> Result<DbPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(&config.connection_url())
        .await?;

    tracing::info!(
        database = %config.name,
        "Database connection pool created with {} max connections",
        config.max_connections
    );

    Ok(pool)
}
