use crate::error::DbError;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::env;
use std::time::Duration;

/// Creates a Postgres connection pool from the `DATABASE_URL` environment
/// variable.
///
/// The caller is responsible for loading `.env` (the binary does this once at
/// startup) so that library consumers can inject the variable however they
/// like.
pub async fn connect() -> Result<PgPool, DbError> {
    let database_url = env::var("DATABASE_URL")
        .map_err(|_| DbError::ConnectionConfigError("DATABASE_URL must be set".to_string()))?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&database_url)
        .await?;

    Ok(pool)
}

/// Applies any pending migrations from the crate's `migrations/` directory.
pub async fn run_migrations(pool: &PgPool) -> Result<(), DbError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
