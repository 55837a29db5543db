//! Database module for the device-local ledger.
//!
//! SQLite holds the ledger between restarts. It is a cache of what this
//! device last saw, never the source of truth for team state.

mod ledger;

pub use ledger::*;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Initialize the database connection pool and run migrations.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool, sqlx::Error> {
    // Ensure the parent directory exists
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Full)
        .busy_timeout(std::time::Duration::from_secs(30));

    // One writer: the terminal actor owns the ledger.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

/// Run database migrations.
async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ledger_entries (
            namespace TEXT NOT NULL,
            entry_key TEXT NOT NULL,
            position INTEGER NOT NULL,
            team TEXT NOT NULL,
            resolved_at TEXT NOT NULL,
            PRIMARY KEY (namespace, entry_key)
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_ledger_position ON ledger_entries(namespace, position);
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
