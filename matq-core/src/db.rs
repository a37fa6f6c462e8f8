use crate::config::DatabaseConfig;
use sqlx::{
    postgres::PgPoolOptions,
    sqlite::{SqlitePool, SqlitePoolOptions},
    PgPool,
};

pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await
}

pub async fn health_check(pool: &PgPool) -> Result<String, sqlx::Error> {
    let row: (String,) = sqlx::query_as("SELECT version()").fetch_one(pool).await?;
    Ok(row.0)
}

/// Open the embedded tabular database.
///
/// An in-memory SQLite database lives exactly as long as its connection, so
/// the pool is pinned to one connection that is never reaped.
pub async fn create_tabular_pool(url: &str) -> Result<SqlitePool, sqlx::Error> {
    SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect(url)
        .await
}

pub async fn tabular_version(pool: &SqlitePool) -> Result<String, sqlx::Error> {
    let row: (String,) = sqlx::query_as("SELECT sqlite_version()")
        .fetch_one(pool)
        .await?;
    Ok(row.0)
}
