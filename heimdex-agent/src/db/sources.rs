//! Source database operations

use crate::models::{Source, SourceKind};
use anyhow::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

const SOURCE_COLUMNS: &str =
    "id, type, path, display_name, drive_nickname, cloud_library_id, present, created_at";

fn source_from_row(row: &SqliteRow) -> Result<Source> {
    let id: String = row.get("id");
    let kind: String = row.get("type");
    let created_at: String = row.get("created_at");

    Ok(Source {
        id: Uuid::parse_str(&id)?,
        kind: SourceKind::from_db(&kind),
        path: row.get("path"),
        display_name: row.get("display_name"),
        drive_nickname: row.get("drive_nickname"),
        cloud_library_id: row.get("cloud_library_id"),
        present: row.get::<i64, _>("present") != 0,
        created_at: super::parse_timestamp(&created_at)?,
    })
}

pub async fn create_source(pool: &SqlitePool, source: &Source) -> Result<()> {
    sqlx::query(
        "INSERT INTO sources (id, type, path, display_name, drive_nickname, cloud_library_id, present, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(source.id.to_string())
    .bind(source.kind.as_str())
    .bind(&source.path)
    .bind(&source.display_name)
    .bind(&source.drive_nickname)
    .bind(&source.cloud_library_id)
    .bind(source.present as i64)
    .bind(source.created_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_source(pool: &SqlitePool, id: Uuid) -> Result<Option<Source>> {
    let row = sqlx::query(&format!("SELECT {SOURCE_COLUMNS} FROM sources WHERE id = ?"))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(source_from_row).transpose()
}

pub async fn get_source_by_path(pool: &SqlitePool, path: &str) -> Result<Option<Source>> {
    let row = sqlx::query(&format!("SELECT {SOURCE_COLUMNS} FROM sources WHERE path = ?"))
        .bind(path)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(source_from_row).transpose()
}

pub async fn list_sources(pool: &SqlitePool) -> Result<Vec<Source>> {
    let rows = sqlx::query(&format!(
        "SELECT {SOURCE_COLUMNS} FROM sources ORDER BY created_at DESC"
    ))
    .fetch_all(pool)
    .await?;

    rows.iter().map(source_from_row).collect()
}

pub async fn delete_source(pool: &SqlitePool, id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM sources WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn update_source_present(pool: &SqlitePool, id: Uuid, present: bool) -> Result<()> {
    sqlx::query("UPDATE sources SET present = ? WHERE id = ?")
        .bind(present as i64)
        .bind(id.to_string())
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn update_source_cloud_library_id(
    pool: &SqlitePool,
    id: Uuid,
    cloud_library_id: &str,
) -> Result<()> {
    sqlx::query("UPDATE sources SET cloud_library_id = ? WHERE id = ?")
        .bind(cloud_library_id)
        .bind(id.to_string())
        .execute(pool)
        .await?;

    Ok(())
}
