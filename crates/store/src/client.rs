//! Connection pool setup.

use router_core::{DbErrorCode, Error, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::info;

use crate::config::DatabaseConfig;

/// Open a connection pool and verify it with one round trip.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(&config.url)
        .await
        .map_err(|e| Error::database(DbErrorCode::ConnectionFailed, e.to_string()))?;

    info!(
        max_connections = config.max_connections,
        "Connected to Postgres"
    );

    Ok(pool)
}

/// Map a sqlx error onto the domain error, separating connectivity problems
/// from query failures.
pub fn db_err(e: sqlx::Error) -> Error {
    let code = match &e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            DbErrorCode::ConnectionFailed
        }
        _ => DbErrorCode::QueryFailed,
    };
    Error::database(code, e.to_string())
}
