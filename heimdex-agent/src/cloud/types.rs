//! Ingest API payloads and error classification

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Request body for `POST /api/ingest/scenes`. Unset optional fields are
/// omitted rather than sent as empty values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneIngestPayload {
    pub video_id: String,
    pub video_title: String,
    pub library_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pipeline_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub model_version: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub total_duration_ms: i64,
    pub scenes: Vec<SceneIngestDoc>,
}

/// One scene document inside the ingest payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneIngestDoc {
    pub scene_id: String,
    pub index: i64,
    pub start_ms: i64,
    pub end_ms: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub keyframe_timestamp_ms: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub transcript_raw: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub speech_segment_count: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub people_cluster_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keyword_tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub product_tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub product_entities: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ocr_text_raw: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub ocr_char_count: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source_type: String,
}

fn is_zero(n: &i64) -> bool {
    *n == 0
}

/// Response from `POST /api/ingest/scenes`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SceneIngestResponse {
    #[serde(default)]
    pub indexed_count: i64,
    #[serde(default)]
    pub video_id: String,
    #[serde(default)]
    pub skipped_count: i64,
}

/// Library returned by `POST /api/libraries`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LibraryInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub created: bool,
}

/// Error from the ingest service.
#[derive(Debug, Clone, Error)]
pub enum UploadError {
    #[error("scene upload failed: HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("upload timed out after {0:?}")]
    Timeout(Duration),
}

impl UploadError {
    /// True for server errors (5xx) and transport failures. Client errors
    /// (4xx) are permanent.
    pub fn is_retryable(&self) -> bool {
        match self {
            UploadError::Http { status, .. } => *status >= 500,
            UploadError::Network(_) | UploadError::Timeout(_) => true,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            UploadError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}
