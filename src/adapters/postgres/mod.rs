//! PostgreSQL adapters.
//!
//! - `PostgresChangeFeed` - LISTEN/NOTIFY feed of `data_collections` changes
//! - `PostgresDashboardResolver` - Dashboards referencing a data collection

mod change_feed;
mod dashboard_resolver;

pub use change_feed::{PostgresChangeFeed, NOTIFY_CHANNEL};
pub use dashboard_resolver::PostgresDashboardResolver;

use sqlx::migrate::MigrateError;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::DatabaseConfig;

/// Builds a pool without connecting.
///
/// Connections are opened on first use, so an unreachable database surfaces
/// as a change feed open failure instead of a startup error. Only a
/// malformed URL fails here.
pub fn lazy_pool(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .min_connections(config.min_connections)
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout())
        .connect_lazy(&config.url)
}

/// Applies the bundled migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<(), MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
