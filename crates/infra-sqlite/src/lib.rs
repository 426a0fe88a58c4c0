// Stevedore Infrastructure - SQLite Broker Adapter
// Implements: Connection, ConnectionFactory

mod broker;
mod connection;
mod migration;

pub use broker::{SqliteConnection, SqliteConnectionFactory};
pub use connection::{connect_options, create_pool, is_sqlite_url};
pub use migration::run_migrations;

// Note: sqlx::Error conversion is handled by wrapping in helper functions
// due to Rust's orphan rules (cannot implement From<sqlx::Error> for AppError here)
