use std::str::FromStr;
use std::time::Duration;

use demande_core::config::DatabaseConfig;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use tracing::debug;

pub type DbPool = sqlx::SqlitePool;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens the enrollment pool described by the `[database]` section.
///
/// Every connection enforces foreign keys, so request lines and grants cannot
/// outlive their request or student, and waits on a locked database instead
/// of failing the compare-and-swap writes immediately.
pub async fn connect(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    let options = connect_options(&config.url)?;
    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections.max(1))
        .acquire_timeout(Duration::from_secs(config.timeout_secs.max(1)))
        .connect_with(options)
        .await?;

    debug!(
        event_name = "db.pool.opened",
        max_connections = config.max_connections.max(1),
        timeout_secs = config.timeout_secs.max(1),
        "enrollment database pool opened"
    );
    Ok(pool)
}

/// Single-connection pool over a private in-memory database.
///
/// The database disappears with its connection, so the pool never recycles it.
pub async fn connect_in_memory() -> Result<DbPool, sqlx::Error> {
    SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(connect_options("sqlite::memory:")?)
        .await
}

fn connect_options(url: &str) -> Result<SqliteConnectOptions, sqlx::Error> {
    Ok(SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT))
}
