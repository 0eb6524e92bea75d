//! Source management and scan endpoints

use crate::error::{ApiError, ApiResult};
use crate::models::{Source, VideoFile};
use crate::AppState;
use axum::extract::{Path, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct SourceView {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub path: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drive_nickname: Option<String>,
    pub present: bool,
    pub created_at: String,
}

impl From<&Source> for SourceView {
    fn from(source: &Source) -> Self {
        Self {
            id: source.id.to_string(),
            kind: source.kind.as_str().to_string(),
            path: source.path.clone(),
            display_name: source.display_name.clone(),
            drive_nickname: source.drive_nickname.clone(),
            present: source.present,
            created_at: source.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FileView {
    pub id: String,
    pub source_id: String,
    pub path: String,
    pub filename: String,
    pub size: i64,
    pub mtime: String,
    pub fingerprint: String,
}

impl From<&VideoFile> for FileView {
    fn from(file: &VideoFile) -> Self {
        Self {
            id: file.id.to_string(),
            source_id: file.source_id.to_string(),
            path: file.path.clone(),
            filename: file.filename.clone(),
            size: file.size,
            mtime: file.mtime.to_rfc3339(),
            fingerprint: file.fingerprint.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SourcesResponse {
    pub sources: Vec<SourceView>,
}

#[derive(Debug, Deserialize)]
pub struct AddFolderRequest {
    pub path: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AddFolderResponse {
    pub source_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub source_id: String,
}

#[derive(Debug, Serialize)]
pub struct ScanResponse {
    pub job_id: String,
}

#[derive(Debug, Serialize)]
pub struct FilesResponse {
    pub files: Vec<FileView>,
}

/// GET /sources
pub async fn list_sources(State(state): State<AppState>) -> ApiResult<Json<SourcesResponse>> {
    let sources = state.catalog.get_sources().await?;
    Ok(Json(SourcesResponse {
        sources: sources.iter().map(SourceView::from).collect(),
    }))
}

/// POST /sources/folders
pub async fn add_folder(
    State(state): State<AppState>,
    Json(request): Json<AddFolderRequest>,
) -> ApiResult<Json<AddFolderResponse>> {
    if request.path.is_empty() {
        return Err(ApiError::BadRequest("path is required".to_string()));
    }

    let source = state
        .catalog
        .add_folder(&request.path, request.display_name)
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    Ok(Json(AddFolderResponse {
        source_id: source.id.to_string(),
    }))
}

/// DELETE /sources/{id}
pub async fn delete_source(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let id = parse_id(&id)?;

    state
        .catalog
        .get_source(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("source not found".to_string()))?;

    state.catalog.remove_source(id).await?;
    Ok(Json(serde_json::json!({ "status": "deleted" })))
}

/// GET /sources/{id}/files
pub async fn list_source_files(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<FilesResponse>> {
    let id = parse_id(&id)?;

    state
        .catalog
        .get_source(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("source not found".to_string()))?;

    let files = state.catalog.get_files(id).await?;
    Ok(Json(FilesResponse {
        files: files.iter().map(FileView::from).collect(),
    }))
}

/// POST /scan
pub async fn trigger_scan(
    State(state): State<AppState>,
    Json(request): Json<ScanRequest>,
) -> ApiResult<Json<ScanResponse>> {
    let source_id = parse_id(&request.source_id)?;

    let job = state
        .catalog
        .scan_source(source_id)
        .await
        .map_err(|e| ApiError::NotFound(e.to_string()))?;

    Ok(Json(ScanResponse {
        job_id: job.id.to_string(),
    }))
}

fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest("invalid source id".to_string()))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/sources", get(list_sources))
        .route("/sources/folders", post(add_folder))
        .route("/sources/:id", delete(delete_source))
        .route("/sources/:id/files", get(list_source_files))
        .route("/scan", post(trigger_scan))
}
