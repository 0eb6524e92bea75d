//! Agent status endpoint
//!
//! One snapshot the companion UI polls: overall state, the active job,
//! counts, and the cached capability probe. Capabilities come from the
//! doctor's non-blocking `peek` so this endpoint never waits on a
//! subprocess.

use crate::api::jobs::JobView;
use crate::db;
use crate::error::ApiResult;
use crate::models::JobStatus;
use crate::AppState;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub state: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub last_error: String,
    pub sources_count: usize,
    pub files_count: i64,
    pub jobs_running: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_job: Option<JobView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipelines: Option<PipelineStatus>,
    pub constraints: Constraints,
}

#[derive(Debug, Serialize)]
pub struct PipelineStatus {
    pub has_speech: bool,
    pub has_faces: bool,
    pub has_scenes: bool,
    pub has_ocr: bool,
    pub last_probe_at: String,
    pub deps_available: i64,
    pub deps_total: i64,
}

#[derive(Debug, Serialize)]
pub struct Constraints {
    pub scenes_requires_speech: bool,
}

/// GET /status
pub async fn status(State(state): State<AppState>) -> ApiResult<Json<StatusResponse>> {
    let sources = state.catalog.get_sources().await.unwrap_or_default();
    let files_count = state.catalog.count_files().await.unwrap_or(0);
    let jobs = db::jobs::list_jobs(&state.db, 10).await.unwrap_or_default();

    let mut agent_state = if state.orchestrator.is_paused() {
        "paused"
    } else {
        "idle"
    };
    let mut active_job = None;
    let mut jobs_running = 0;
    let mut last_error = String::new();

    for job in &jobs {
        if job.status == JobStatus::Running {
            agent_state = "indexing";
            active_job = Some(JobView::from(job));
            jobs_running += 1;
        }
        if job.status == JobStatus::Failed && last_error.is_empty() {
            last_error = job.error.clone().unwrap_or_default();
        }
    }

    if !last_error.is_empty() && agent_state == "idle" {
        agent_state = "error";
    }

    let pipelines = state.doctor.as_ref().and_then(|doctor| {
        doctor.peek().map(|caps| PipelineStatus {
            has_speech: caps.has_speech,
            has_faces: caps.has_faces,
            has_scenes: caps.has_scenes,
            has_ocr: caps.has_ocr,
            last_probe_at: caps.probed_at.to_rfc3339(),
            deps_available: caps.report.summary.available,
            deps_total: caps.report.summary.total,
        })
    });

    Ok(Json(StatusResponse {
        state: agent_state.to_string(),
        last_error,
        sources_count: sources.len(),
        files_count,
        jobs_running,
        active_job,
        pipelines,
        constraints: Constraints {
            scenes_requires_speech: true,
        },
    }))
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/status", get(status))
}
