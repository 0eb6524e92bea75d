//! Database initialization
//!
//! Opens (or creates) the agent SQLite database, applies the idempotent
//! schema, and performs the crash-recovery sweep: any job left `running` by
//! a previous process is rewritten to `failed` so no row stays `running`
//! across process lifetimes.

use crate::{Error, Result};
use sqlx::SqlitePool;
use std::path::Path;
use tracing::{info, warn};

/// Initialize the database connection and create tables if needed.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| Error::DataDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePool::connect(&db_url).await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    create_schema(&pool).await?;

    match mark_interrupted_jobs(&pool).await {
        Ok(0) => {}
        Ok(n) => warn!(count = n, "marked interrupted jobs as failed"),
        Err(e) => warn!(error = %e, "failed to mark interrupted jobs"),
    }

    Ok(pool)
}

/// Create all tables and indexes (idempotent, safe to call repeatedly).
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    let tag = |table| move |source| Error::Schema { table, source };
    create_sources_table(pool).await.map_err(tag("sources"))?;
    create_files_table(pool).await.map_err(tag("files"))?;
    create_jobs_table(pool).await.map_err(tag("jobs"))?;
    create_config_table(pool).await.map_err(tag("config"))?;
    Ok(())
}

async fn create_sources_table(pool: &SqlitePool) -> std::result::Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sources (
            id TEXT PRIMARY KEY,
            type TEXT NOT NULL,
            path TEXT NOT NULL UNIQUE,
            display_name TEXT NOT NULL,
            drive_nickname TEXT,
            cloud_library_id TEXT,
            present INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_files_table(pool: &SqlitePool) -> std::result::Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS files (
            id TEXT PRIMARY KEY,
            source_id TEXT NOT NULL REFERENCES sources(id) ON DELETE CASCADE,
            path TEXT NOT NULL,
            filename TEXT NOT NULL,
            size INTEGER NOT NULL,
            mtime TEXT NOT NULL,
            fingerprint TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE(source_id, path)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_files_source_id ON files(source_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_files_fingerprint ON files(fingerprint)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_jobs_table(pool: &SqlitePool) -> std::result::Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            id TEXT PRIMARY KEY,
            type TEXT NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('pending', 'running', 'completed', 'failed')),
            source_id TEXT REFERENCES sources(id) ON DELETE SET NULL,
            file_id TEXT REFERENCES files(id) ON DELETE SET NULL,
            progress INTEGER NOT NULL DEFAULT 0,
            error TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_source_id ON jobs(source_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_file_id ON jobs(file_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_created_at ON jobs(created_at DESC)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_config_table(pool: &SqlitePool) -> std::result::Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS config (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Rewrite every `running` job to `failed`.
///
/// A row can only be `running` here if a previous process died mid-job;
/// the poll loop re-reads job state from this table, never from memory.
async fn mark_interrupted_jobs(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE jobs SET status = 'failed', error = 'interrupted by restart', \
         updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE status = 'running'",
    )
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
