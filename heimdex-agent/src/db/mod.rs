//! Repository modules
//!
//! All persistence goes through these functions; no other module issues raw
//! SQL. Timestamps are stored as RFC 3339 TEXT.

pub mod files;
pub mod jobs;
pub mod settings;
pub mod sources;

use anyhow::Context;
use chrono::{DateTime, NaiveDateTime, Utc};

/// Parse a stored timestamp. Accepts RFC 3339 and the `YYYY-MM-DD HH:MM:SS`
/// form SQLite's `datetime()` produces.
pub(crate) fn parse_timestamp(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .with_context(|| format!("unparseable timestamp: {raw}"))?;
    Ok(naive.and_utc())
}

#[cfg(test)]
pub(crate) async fn test_pool() -> sqlx::SqlitePool {
    // A single connection so every query sees the same in-memory database.
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory database");
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await
        .unwrap();
    heimdex_common::db::create_schema(&pool).await.unwrap();
    pool
}
