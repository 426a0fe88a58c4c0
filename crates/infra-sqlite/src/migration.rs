// Migration Runner

use crate::broker::map_sqlx_error;
use sqlx::SqlitePool;
use stevedore_core::error::Result;
use tracing::{debug, info};

/// Ordered schema migrations: (version, description, SQL)
const MIGRATIONS: &[(i64, &str, &str)] = &[
    (1, "jobs", include_str!("../migrations/001_initial_schema.sql")),
    (2, "worker registry", include_str!("../migrations/002_workers.sql")),
];

/// Bring the broker schema up to the latest version.
///
/// Each file records its own version. Statements use `IF NOT EXISTS` /
/// `INSERT OR IGNORE`, so concurrent runs from several workers are safe.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let current = current_version(pool).await?;
    debug!(current, "Broker schema version");

    for (version, description, sql) in MIGRATIONS {
        if *version <= current {
            continue;
        }
        info!(version, description, "Applying broker migration");
        let mut tx = pool.begin().await.map_err(map_sqlx_error)?;
        for statement in statements(sql) {
            sqlx::query(&statement)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
        }
        tx.commit().await.map_err(map_sqlx_error)?;
    }

    Ok(())
}

async fn current_version(pool: &SqlitePool) -> Result<i64> {
    let has_table: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_version')",
    )
    .fetch_one(pool)
    .await
    .map_err(map_sqlx_error)?;
    if !has_table {
        return Ok(0);
    }

    let version: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
        .fetch_one(pool)
        .await
        .map_err(map_sqlx_error)?;
    Ok(version.unwrap_or(0))
}

/// Split a migration file into statements, dropping `--` comment lines
fn statements(sql: &str) -> Vec<String> {
    sql.split(';')
        .map(|chunk| {
            chunk
                .lines()
                .filter(|line| !line.trim_start().starts_with("--"))
                .collect::<Vec<_>>()
                .join("\n")
                .trim()
                .to_string()
        })
        .filter(|statement| !statement.is_empty())
        .collect()
}
