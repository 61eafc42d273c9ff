//! SQLite connection management.
//!
//! With `[db].path` set, the index lives in that file with WAL enabled so
//! readers are not blocked by the single writer. Without it, the index is an
//! in-memory database. An in-memory SQLite database exists per connection,
//! so that pool holds exactly one connection that never idles out.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

use crate::config::Config;
use crate::error::Result;

/// Create a connection pool for the configured store.
pub async fn connect(config: &Config) -> Result<SqlitePool> {
    let pool = match &config.db.path {
        Some(db_path) => {
            // Ensure parent directory exists
            if let Some(parent) = db_path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal);

            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await?
        }
        None => {
            let options = SqliteConnectOptions::from_str("sqlite::memory:")?;

            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        }
    };

    Ok(pool)
}
