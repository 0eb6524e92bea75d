//! File database operations
//!
//! Catalogued videos are unique per (source_id, path); re-scans refresh the
//! existing row in place rather than duplicating it.

use crate::models::VideoFile;
use anyhow::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

const FILE_COLUMNS: &str = "id, source_id, path, filename, size, mtime, fingerprint, created_at";

fn file_from_row(row: &SqliteRow) -> Result<VideoFile> {
    let id: String = row.get("id");
    let source_id: String = row.get("source_id");
    let mtime: String = row.get("mtime");
    let created_at: String = row.get("created_at");

    Ok(VideoFile {
        id: Uuid::parse_str(&id)?,
        source_id: Uuid::parse_str(&source_id)?,
        path: row.get("path"),
        filename: row.get("filename"),
        size: row.get("size"),
        mtime: super::parse_timestamp(&mtime)?,
        fingerprint: row.get("fingerprint"),
        created_at: super::parse_timestamp(&created_at)?,
    })
}

/// Insert a file row, or refresh size/mtime/fingerprint of the existing row
/// with the same (source_id, path).
pub async fn upsert_file(pool: &SqlitePool, file: &VideoFile) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO files (id, source_id, path, filename, size, mtime, fingerprint, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(source_id, path) DO UPDATE SET
            size = excluded.size,
            mtime = excluded.mtime,
            fingerprint = excluded.fingerprint
        "#,
    )
    .bind(file.id.to_string())
    .bind(file.source_id.to_string())
    .bind(&file.path)
    .bind(&file.filename)
    .bind(file.size)
    .bind(file.mtime.to_rfc3339())
    .bind(&file.fingerprint)
    .bind(file.created_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_file(pool: &SqlitePool, id: Uuid) -> Result<Option<VideoFile>> {
    let row = sqlx::query(&format!("SELECT {FILE_COLUMNS} FROM files WHERE id = ?"))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(file_from_row).transpose()
}

pub async fn list_files(pool: &SqlitePool) -> Result<Vec<VideoFile>> {
    let rows = sqlx::query(&format!(
        "SELECT {FILE_COLUMNS} FROM files ORDER BY created_at DESC"
    ))
    .fetch_all(pool)
    .await?;

    rows.iter().map(file_from_row).collect()
}

pub async fn list_files_by_source(pool: &SqlitePool, source_id: Uuid) -> Result<Vec<VideoFile>> {
    let rows = sqlx::query(&format!(
        "SELECT {FILE_COLUMNS} FROM files WHERE source_id = ? ORDER BY filename"
    ))
    .bind(source_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(file_from_row).collect()
}

pub async fn delete_files_by_source(pool: &SqlitePool, source_id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM files WHERE source_id = ?")
        .bind(source_id.to_string())
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn count_files(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM files")
        .fetch_one(pool)
        .await?;
    Ok(count)
}
