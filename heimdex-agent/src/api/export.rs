//! EDL export endpoint

use crate::error::{ApiError, ApiResult};
use crate::export::{self, ExportRequest, ExportResponse, ResolvedClip};
use crate::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::json;
use uuid::Uuid;

/// POST /export/edl
pub async fn export_edl(
    State(state): State<AppState>,
    Json(request): Json<ExportRequest>,
) -> ApiResult<Response> {
    if !request.format.eq_ignore_ascii_case("edl") {
        return Err(ApiError::BadRequest("format must be edl".to_string()));
    }

    export::validate_output_dir(&request.output_dir).map_err(ApiError::BadRequest)?;

    if request.clips.is_empty() {
        return Err(ApiError::BadRequest("clips must not be empty".to_string()));
    }

    let mut project_name = export::sanitize_name(&request.project_name, 120);
    if project_name.is_empty() {
        project_name = "heimdex_export".to_string();
    }

    let frame_rate = if request.frame_rate > 0.0 {
        request.frame_rate
    } else {
        30.0
    };

    let mut resolved = Vec::with_capacity(request.clips.len());
    let mut unresolved = Vec::new();

    for clip in &request.clips {
        if clip.video_id.is_empty() {
            return Err(ApiError::BadRequest("video_id is required".to_string()));
        }
        if clip.start_ms >= clip.end_ms {
            return Err(ApiError::BadRequest(
                "start_ms must be less than end_ms".to_string(),
            ));
        }

        let file_id = Uuid::parse_str(&clip.video_id)
            .ok()
            .map(|id| state.catalog.get_file(id));
        let file = match file_id {
            Some(lookup) => lookup.await?,
            None => None,
        };

        let Some(file) = file else {
            unresolved.push(clip.video_id.clone());
            continue;
        };

        let mut clip_name = export::sanitize_name(&clip.clip_name, 160);
        if clip_name.is_empty() {
            clip_name = clip.video_id.clone();
        }

        resolved.push(ResolvedClip {
            clip_name,
            media_path: file.path,
            start_ms: clip.start_ms,
            end_ms: clip.end_ms,
        });
    }

    if resolved.is_empty() {
        let body = Json(json!({
            "error": "no clips could be resolved",
            "code": "UNRESOLVABLE_CLIPS",
        }));
        return Ok((StatusCode::UNPROCESSABLE_ENTITY, body).into_response());
    }

    let edl = export::generate_edl(&resolved, &project_name, frame_rate);
    let output_path = std::path::Path::new(&request.output_dir).join(format!("{project_name}.edl"));
    tokio::fs::write(&output_path, edl.as_bytes())
        .await
        .map_err(|_| ApiError::Internal("failed to write export file".to_string()))?;

    Ok(Json(ExportResponse {
        status: "ok".to_string(),
        format: "edl".to_string(),
        output_path: output_path.to_string_lossy().into_owned(),
        clip_count: resolved.len(),
        unresolved_clips: unresolved,
    })
    .into_response())
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/export/edl", post(export_edl))
}
