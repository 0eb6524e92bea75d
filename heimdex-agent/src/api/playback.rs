//! Byte-range video serving
//!
//! Single-range RFC 7233 semantics: a satisfiable `Range` gets 206 with
//! `Content-Range`, an unsatisfiable one gets 416, and a missing or
//! malformed header falls back to a full 200 response. The body is
//! streamed, never buffered whole.

use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::AppState;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use uuid::Uuid;

#[derive(Debug, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn content_length(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{total}", self.start, self.end)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum RangeError {
    Invalid,
    Unsatisfiable,
}

/// Parse a `Range` header against a resource of `size` bytes. Returns
/// `Ok(None)` when no header is present; only the first range of a
/// multi-range header is honored.
pub fn parse_range(header: Option<&str>, size: u64) -> Result<Option<ByteRange>, RangeError> {
    let Some(header) = header else {
        return Ok(None);
    };

    let spec = header.strip_prefix("bytes=").ok_or(RangeError::Invalid)?;
    let spec = match spec.find(',') {
        Some(idx) => spec[..idx].trim(),
        None => spec,
    };

    let (start_raw, end_raw) = spec.split_once('-').ok_or(RangeError::Invalid)?;

    let (start, end) = if start_raw.is_empty() {
        // Suffix range: last N bytes.
        let suffix_len: u64 = end_raw.parse().map_err(|_| RangeError::Invalid)?;
        if suffix_len == 0 {
            return Err(RangeError::Invalid);
        }
        (size.saturating_sub(suffix_len), size.saturating_sub(1))
    } else {
        let start: u64 = start_raw.parse().map_err(|_| RangeError::Invalid)?;
        let end = if end_raw.is_empty() {
            size.saturating_sub(1)
        } else {
            end_raw.parse().map_err(|_| RangeError::Invalid)?
        };
        (start, end)
    };

    if start > end || start >= size {
        return Err(RangeError::Unsatisfiable);
    }

    Ok(Some(ByteRange {
        start,
        end: end.min(size.saturating_sub(1)),
    }))
}

fn content_type_for(path: &str) -> &'static str {
    match Path::new(path)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .as_deref()
    {
        Some("mp4") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("mkv") => "video/x-matroska",
        _ => "application/octet-stream",
    }
}

#[derive(Debug, Deserialize)]
pub struct PlaybackQuery {
    pub file_id: String,
}

/// GET /playback/file?file_id=…
pub async fn serve_file(
    State(state): State<AppState>,
    Query(query): Query<PlaybackQuery>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let file_id = Uuid::parse_str(&query.file_id)
        .map_err(|_| ApiError::BadRequest("invalid file id".to_string()))?;

    let file = db::files::get_file(&state.db, file_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("file not found".to_string()))?;

    // A file whose backing drive is unreachable is reported as such, not
    // as a generic missing file.
    if let Some(source) = db::sources::get_source(&state.db, file.source_id).await? {
        if !source.present {
            let nickname = source.drive_nickname.unwrap_or(source.display_name);
            return Err(ApiError::DriveDisconnected(nickname));
        }
    }

    let mut handle = match tokio::fs::File::open(&file.path).await {
        Ok(handle) => handle,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::NotFound("file not found on disk".to_string()));
        }
        Err(e) => return Err(e.into()),
    };
    let size = handle.metadata().await?.len();

    let range_header = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok());

    let parsed = match parse_range(range_header, size) {
        Err(RangeError::Unsatisfiable) => {
            let response = Response::builder()
                .status(StatusCode::RANGE_NOT_SATISFIABLE)
                .header(header::CONTENT_RANGE, format!("bytes */{size}"))
                .body(Body::empty())
                .map_err(|e| ApiError::Internal(e.to_string()))?;
            return Ok(response);
        }
        // A malformed Range header falls back to a full response.
        Err(RangeError::Invalid) | Ok(None) => None,
        Ok(range) => range,
    };

    let content_type = content_type_for(&file.path);

    let response = match parsed {
        None => Response::builder()
            .status(StatusCode::OK)
            .header(header::ACCEPT_RANGES, "bytes")
            .header(header::CONTENT_TYPE, content_type)
            .header(header::CONTENT_LENGTH, size)
            .body(Body::from_stream(ReaderStream::new(handle)))
            .map_err(|e| ApiError::Internal(e.to_string()))?,
        Some(range) => {
            handle
                .seek(std::io::SeekFrom::Start(range.start))
                .await?;
            let limited = handle.take(range.content_length());

            Response::builder()
                .status(StatusCode::PARTIAL_CONTENT)
                .header(header::ACCEPT_RANGES, "bytes")
                .header(header::CONTENT_TYPE, content_type)
                .header(header::CONTENT_LENGTH, range.content_length())
                .header(header::CONTENT_RANGE, range.content_range(size))
                .body(Body::from_stream(ReaderStream::new(limited)))
                .map_err(|e| ApiError::Internal(e.to_string()))?
        }
    };

    Ok(response)
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/playback/file", get(serve_file))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_header_is_full_response() {
        assert_eq!(parse_range(None, 100).unwrap(), None);
    }

    #[test]
    fn single_byte_range() {
        let range = parse_range(Some("bytes=0-0"), 100).unwrap().unwrap();
        assert_eq!(range, ByteRange { start: 0, end: 0 });
        assert_eq!(range.content_length(), 1);
        assert_eq!(range.content_range(100), "bytes 0-0/100");
    }

    #[test]
    fn open_ended_range_runs_to_eof() {
        let range = parse_range(Some("bytes=10-"), 100).unwrap().unwrap();
        assert_eq!(range, ByteRange { start: 10, end: 99 });
    }

    #[test]
    fn suffix_range_takes_last_bytes() {
        let range = parse_range(Some("bytes=-10"), 100).unwrap().unwrap();
        assert_eq!(range, ByteRange { start: 90, end: 99 });

        // Suffix longer than the file clamps to the whole file.
        let range = parse_range(Some("bytes=-200"), 100).unwrap().unwrap();
        assert_eq!(range, ByteRange { start: 0, end: 99 });
    }

    #[test]
    fn end_past_eof_is_clamped() {
        let range = parse_range(Some("bytes=50-500"), 100).unwrap().unwrap();
        assert_eq!(range, ByteRange { start: 50, end: 99 });
    }

    #[test]
    fn start_at_or_past_size_is_unsatisfiable() {
        assert_eq!(parse_range(Some("bytes=100-"), 100), Err(RangeError::Unsatisfiable));
        assert_eq!(parse_range(Some("bytes=150-200"), 100), Err(RangeError::Unsatisfiable));
    }

    #[test]
    fn inverted_range_is_unsatisfiable() {
        assert_eq!(parse_range(Some("bytes=50-10"), 100), Err(RangeError::Unsatisfiable));
    }

    #[test]
    fn malformed_headers_are_invalid() {
        assert_eq!(parse_range(Some("octets=0-1"), 100), Err(RangeError::Invalid));
        assert_eq!(parse_range(Some("bytes=abc-def"), 100), Err(RangeError::Invalid));
        assert_eq!(parse_range(Some("bytes=-0"), 100), Err(RangeError::Invalid));
        assert_eq!(parse_range(Some("bytes=5"), 100), Err(RangeError::Invalid));
    }

    #[test]
    fn multi_range_uses_first_part() {
        let range = parse_range(Some("bytes=0-9, 20-29"), 100).unwrap().unwrap();
        assert_eq!(range, ByteRange { start: 0, end: 9 });
    }

    #[test]
    fn content_types_by_extension() {
        assert_eq!(content_type_for("/v/a.mp4"), "video/mp4");
        assert_eq!(content_type_for("/v/a.MOV"), "video/quicktime");
        assert_eq!(content_type_for("/v/a.mkv"), "video/x-matroska");
        assert_eq!(content_type_for("/v/a.bin"), "application/octet-stream");
    }

    mod handler {
        use super::super::{serve_file, PlaybackQuery};
        use crate::error::ApiError;
        use crate::models::{Source, SourceKind, VideoFile};
        use crate::services::{CatalogService, JobOrchestrator, OrchestratorConfig};
        use crate::AppState;
        use axum::extract::{Query, State};
        use axum::http::HeaderMap;
        use chrono::Utc;
        use std::path::Path;
        use std::sync::Arc;
        use uuid::Uuid;

        async fn state(pool: &sqlx::SqlitePool) -> AppState {
            AppState {
                db: pool.clone(),
                catalog: CatalogService::new(pool.clone()),
                orchestrator: Arc::new(JobOrchestrator::new(
                    pool.clone(),
                    CatalogService::new(pool.clone()),
                    OrchestratorConfig::default(),
                )),
                doctor: None,
                device_id: "test-device".to_string(),
                started_at: Utc::now(),
            }
        }

        async fn seed(
            pool: &sqlx::SqlitePool,
            present: bool,
            nickname: Option<&str>,
            video_path: &Path,
        ) -> VideoFile {
            let source = Source {
                id: Uuid::new_v4(),
                kind: SourceKind::RemovableDisk,
                path: "/mnt/usb".to_string(),
                display_name: "USB Drive".to_string(),
                drive_nickname: nickname.map(str::to_string),
                cloud_library_id: None,
                present,
                created_at: Utc::now(),
            };
            crate::db::sources::create_source(pool, &source).await.unwrap();

            let file = VideoFile {
                id: Uuid::new_v4(),
                source_id: source.id,
                path: video_path.to_string_lossy().into_owned(),
                filename: "clip.mp4".to_string(),
                size: 4,
                mtime: Utc::now(),
                fingerprint: "ff".to_string(),
                created_at: Utc::now(),
            };
            crate::db::files::upsert_file(pool, &file).await.unwrap();
            file
        }

        #[tokio::test]
        async fn disconnected_drive_blocks_playback() {
            let pool = crate::db::test_pool().await;
            let dir = tempfile::tempdir().unwrap();
            let video = dir.path().join("clip.mp4");
            std::fs::write(&video, b"data").unwrap();

            let file = seed(&pool, false, Some("Shuttle SSD"), &video).await;

            let result = serve_file(
                State(state(&pool).await),
                Query(PlaybackQuery {
                    file_id: file.id.to_string(),
                }),
                HeaderMap::new(),
            )
            .await;

            match result {
                Err(ApiError::DriveDisconnected(nickname)) => {
                    assert_eq!(nickname, "Shuttle SSD");
                }
                Err(other) => panic!("unexpected error: {other:?}"),
                Ok(response) => {
                    panic!("expected DriveDisconnected, got status {}", response.status())
                }
            }
        }

        #[tokio::test]
        async fn disconnected_drive_without_nickname_names_the_source() {
            let pool = crate::db::test_pool().await;
            let dir = tempfile::tempdir().unwrap();
            let video = dir.path().join("clip.mp4");
            std::fs::write(&video, b"data").unwrap();

            let file = seed(&pool, false, None, &video).await;

            let result = serve_file(
                State(state(&pool).await),
                Query(PlaybackQuery {
                    file_id: file.id.to_string(),
                }),
                HeaderMap::new(),
            )
            .await;

            match result {
                Err(ApiError::DriveDisconnected(nickname)) => {
                    assert_eq!(nickname, "USB Drive");
                }
                Err(other) => panic!("unexpected error: {other:?}"),
                Ok(response) => {
                    panic!("expected DriveDisconnected, got status {}", response.status())
                }
            }
        }

        #[tokio::test]
        async fn present_drive_serves_the_file() {
            let pool = crate::db::test_pool().await;
            let dir = tempfile::tempdir().unwrap();
            let video = dir.path().join("clip.mp4");
            std::fs::write(&video, b"data").unwrap();

            let file = seed(&pool, true, Some("Shuttle SSD"), &video).await;

            let response = serve_file(
                State(state(&pool).await),
                Query(PlaybackQuery {
                    file_id: file.id.to_string(),
                }),
                HeaderMap::new(),
            )
            .await
            .unwrap();

            assert_eq!(response.status(), axum::http::StatusCode::OK);
        }
    }
}
