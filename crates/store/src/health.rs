//! Database health checks.

use sqlx::PgPool;
use telemetry::health;
use tracing::{debug, error};

use crate::client::db_err;
use crate::schema::all_tables;

/// Check the connection and record the result in the health registry.
pub async fn check_connection(pool: &PgPool) -> bool {
    match sqlx::query("SELECT 1").execute(pool).await {
        Ok(_) => {
            debug!("Postgres connection healthy");
            health().database.set_healthy();
            true
        }
        Err(e) => {
            error!("Postgres health check failed: {}", e);
            health().database.set_unhealthy(e.to_string());
            false
        }
    }
}

/// Create the lead router tables if they do not exist.
pub async fn init_schema(pool: &PgPool) -> router_core::Result<()> {
    for ddl in all_tables() {
        sqlx::query(ddl).execute(pool).await.map_err(db_err)?;
    }

    debug!("Postgres schema initialized");
    Ok(())
}
