// SQLite Connection Pool Setup

use crate::broker::map_sqlx_error;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use stevedore_core::error::{AppError, Result};
use std::str::FromStr;
use std::time::Duration;

const MAX_CONNECTIONS: u32 = 4;

/// True for URLs this adapter can open (`sqlite:...`, `:memory:` or a bare path)
pub fn is_sqlite_url(url: &str) -> bool {
    url.starts_with("sqlite:") || !url.contains("://")
}

fn is_in_memory(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

/// Parse a broker URL into connect options. No I/O.
pub fn connect_options(database_url: &str) -> Result<SqliteConnectOptions> {
    if !is_sqlite_url(database_url) {
        return Err(AppError::Configuration(format!(
            "Unsupported broker URL '{}': only sqlite brokers are available",
            database_url
        )));
    }
    SqliteConnectOptions::from_str(database_url).map_err(|e| {
        AppError::Configuration(format!("Invalid broker URL '{}': {}", database_url, e))
    })
}

/// Create SQLite connection pool with WAL mode
///
/// In-memory databases live as long as their single pooled connection.
pub async fn create_pool(database_url: &str) -> Result<SqlitePool> {
    let options = connect_options(database_url)?
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .create_if_missing(true);

    let pool_options = if is_in_memory(database_url) {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(MAX_CONNECTIONS)
    };

    let pool = pool_options
        .connect_with(options)
        .await
        .map_err(map_sqlx_error)?;

    Ok(pool)
}
