use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use crate::config::AppConfig;
use crate::errors::AppError;

pub mod cache;
pub mod game;
pub mod player;
pub mod rating;
pub mod stats;

/// Open the shared sqlite pool and apply migrations.
///
/// WAL mode plus a busy timeout lets the ingest workers and the API share
/// the file; the rating subprocess opens its own pool on the same path.
pub async fn connect(config: &AppConfig) -> Result<SqlitePool, AppError> {
    if let Some(parent) = config.sqlite_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut options = SqliteConnectOptions::new()
        .filename(&config.sqlite_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .foreign_keys(true);
    if !config.echosql {
        use sqlx::ConnectOptions;
        options = options.disable_statement_logging();
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(16)
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// In-memory pool for tests.
#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    let options = SqliteConnectOptions::new()
        .in_memory(true)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .expect("in-memory sqlite");
    sqlx::migrate!("./migrations").run(&pool).await.expect("migrations");
    pool
}
