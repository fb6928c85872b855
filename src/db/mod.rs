mod models;

pub use models::*;

use anyhow::Result;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::SqlitePool;
use std::path::Path;
use tracing::info;

use crate::config::StorageConfig;

pub type DbPool = SqlitePool;

/// Execute a SQL migration file, properly handling comments
async fn execute_sql(pool: &SqlitePool, sql: &str) -> Result<()> {
    for statement in sql.split(';') {
        // Strip SQL comment lines (lines starting with --)
        let cleaned: String = statement
            .lines()
            .filter(|line| !line.trim().starts_with("--"))
            .collect::<Vec<_>>()
            .join("\n");
        let trimmed = cleaned.trim();
        if !trimmed.is_empty() {
            sqlx::query(trimmed).execute(pool).await?;
        }
    }
    Ok(())
}

pub async fn init(data_dir: &Path, storage: &StorageConfig) -> Result<DbPool> {
    let db_path = data_dir.join("lessonbook.db");

    info!("Initializing database at {}", db_path.display());

    // Pragmas go on the connect options so every pooled connection gets them
    let options = SqliteConnectOptions::new()
        .filename(&db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(storage.busy_timeout());

    let pool = SqlitePoolOptions::new()
        .max_connections(storage.max_connections)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    info!("Database initialized successfully");
    Ok(pool)
}

async fn table_exists(pool: &SqlitePool, table: &str) -> Result<bool> {
    let found: Option<(String,)> =
        sqlx::query_as("SELECT name FROM sqlite_master WHERE type='table' AND name = ?")
            .bind(table)
            .fetch_optional(pool)
            .await?;
    Ok(found.is_some())
}

async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    info!("Running database migrations...");

    // Migration 001: availability, bookings and reviews
    if !table_exists(pool, "lesson_bookings").await? {
        execute_sql(pool, include_str!("../../migrations/001_scheduling.sql")).await?;
    }

    // Migration 002: credit balances and the credit journal
    if !table_exists(pool, "user_credits").await? {
        execute_sql(pool, include_str!("../../migrations/002_credits.sql")).await?;
    }

    // Migration 003: identity/profile read models
    if !table_exists(pool, "teacher_profiles").await? {
        execute_sql(pool, include_str!("../../migrations/003_directory.sql")).await?;
    }

    info!("Migrations completed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_init_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageConfig::default();

        let pool = init(dir.path(), &storage).await.unwrap();
        pool.close().await;

        // Second start against the same file must not re-run migrations
        let pool = init(dir.path(), &storage).await.unwrap();
        for table in [
            "teacher_availability",
            "lesson_bookings",
            "lesson_reviews",
            "user_credits",
            "credit_transactions",
            "user_roles",
            "teacher_profiles",
        ] {
            assert!(table_exists(&pool, table).await.unwrap(), "missing {}", table);
        }
    }

    #[tokio::test]
    async fn test_credit_invariant_enforced_by_schema() {
        let dir = tempfile::tempdir().unwrap();
        let pool = init(dir.path(), &StorageConfig::default()).await.unwrap();

        let result = sqlx::query(
            "INSERT INTO user_credits (user_id, total_credits, used_credits, available_credits, created_at, updated_at)
             VALUES ('u1', 1, 2, -1, 'x', 'x')",
        )
        .execute(&pool)
        .await;
        assert!(result.is_err());
    }
}
