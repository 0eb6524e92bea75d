//! Job queue database operations
//!
//! The jobs table is the durable work queue: the poll loop reads the oldest
//! pending row, and all state transitions go through `update_job_status` /
//! `update_job_progress` so `updated_at` always reflects the last change
//! (the upload backoff timer keys off it).

use crate::models::{Job, JobStatus, JobType};
use anyhow::{anyhow, Result};
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

const JOB_COLUMNS: &str =
    "id, type, status, source_id, file_id, progress, error, created_at, updated_at";

fn job_from_row(row: &SqliteRow) -> Result<Job> {
    let id: String = row.get("id");
    let job_type: String = row.get("type");
    let status: String = row.get("status");
    let source_id: Option<String> = row.get("source_id");
    let file_id: Option<String> = row.get("file_id");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(Job {
        id: Uuid::parse_str(&id)?,
        job_type: JobType::from_db(&job_type),
        status: JobStatus::from_db(&status).ok_or_else(|| anyhow!("unknown job status: {status}"))?,
        source_id: source_id.as_deref().map(Uuid::parse_str).transpose()?,
        file_id: file_id.as_deref().map(Uuid::parse_str).transpose()?,
        progress: row.get("progress"),
        error: row.get("error"),
        created_at: super::parse_timestamp(&created_at)?,
        updated_at: super::parse_timestamp(&updated_at)?,
    })
}

pub async fn create_job(pool: &SqlitePool, job: &Job) -> Result<()> {
    sqlx::query(
        "INSERT INTO jobs (id, type, status, source_id, file_id, progress, error, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(job.id.to_string())
    .bind(job.job_type.as_str())
    .bind(job.status.as_str())
    .bind(job.source_id.map(|id| id.to_string()))
    .bind(job.file_id.map(|id| id.to_string()))
    .bind(job.progress)
    .bind(&job.error)
    .bind(job.created_at.to_rfc3339())
    .bind(job.updated_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_job(pool: &SqlitePool, id: Uuid) -> Result<Option<Job>> {
    let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?"))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(job_from_row).transpose()
}

/// Most recent jobs first, for the UI job list.
pub async fn list_jobs(pool: &SqlitePool, limit: i64) -> Result<Vec<Job>> {
    let limit = if limit <= 0 { 50 } else { limit };
    let rows = sqlx::query(&format!(
        "SELECT {JOB_COLUMNS} FROM jobs ORDER BY created_at DESC LIMIT ?"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter().map(job_from_row).collect()
}

/// Pending jobs, oldest first. The head of this list is the next job the
/// poll loop dispatches.
pub async fn list_pending_jobs(pool: &SqlitePool) -> Result<Vec<Job>> {
    let rows = sqlx::query(&format!(
        "SELECT {JOB_COLUMNS} FROM jobs WHERE status = 'pending' ORDER BY created_at ASC"
    ))
    .fetch_all(pool)
    .await?;

    rows.iter().map(job_from_row).collect()
}

pub async fn update_job_status(
    pool: &SqlitePool,
    id: Uuid,
    status: JobStatus,
    error: Option<&str>,
) -> Result<()> {
    sqlx::query("UPDATE jobs SET status = ?, error = ?, updated_at = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(error)
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn update_job_progress(pool: &SqlitePool, id: Uuid, progress: i64) -> Result<()> {
    sqlx::query("UPDATE jobs SET progress = ?, updated_at = ? WHERE id = ?")
        .bind(progress)
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn count_jobs_with_status(pool: &SqlitePool, status: JobStatus) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE status = ?")
        .bind(status.as_str())
        .fetch_one(pool)
        .await?;
    Ok(count)
}
