//! Connection pool setup.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Connect to Postgres using `DATABASE_URL`.
pub async fn connect_from_env() -> anyhow::Result<PgPool> {
    let database_url =
        std::env::var("DATABASE_URL").map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;
    connect(&database_url).await
}

/// Connect with the workspace's standard pool sizing.
///
/// Every tenant-scoped request holds one connection for its whole
/// transaction, so the pool is sized for request concurrency, not statement
/// concurrency.
pub async fn connect(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(
            std::env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(16),
        )
        .connect(database_url)
        .await?;
    Ok(pool)
}
