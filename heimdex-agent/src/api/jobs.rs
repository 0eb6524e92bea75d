//! Job listing endpoints

use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::models::Job;
use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Serialized job shape shared by /jobs and /status.
#[derive(Debug, Clone, Serialize)]
pub struct JobView {
    pub id: String,
    #[serde(rename = "type")]
    pub job_type: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    pub progress: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&Job> for JobView {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.to_string(),
            job_type: job.job_type.as_str().to_string(),
            status: job.status.as_str().to_string(),
            source_id: job.source_id.map(|id| id.to_string()),
            file_id: job.file_id.map(|id| id.to_string()),
            progress: job.progress,
            error: job.error.clone(),
            created_at: job.created_at.to_rfc3339(),
            updated_at: job.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct JobsResponse {
    pub jobs: Vec<JobView>,
}

/// GET /jobs
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> ApiResult<Json<JobsResponse>> {
    let jobs = db::jobs::list_jobs(&state.db, query.limit.unwrap_or(50)).await?;
    Ok(Json(JobsResponse {
        jobs: jobs.iter().map(JobView::from).collect(),
    }))
}

/// GET /jobs/{id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<JobView>> {
    let id = Uuid::parse_str(&id)
        .map_err(|_| ApiError::BadRequest("invalid job id".to_string()))?;

    let job = db::jobs::get_job(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("job not found".to_string()))?;

    Ok(Json(JobView::from(&job)))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/jobs", get(list_jobs))
        .route("/jobs/:id", get(get_job))
}
