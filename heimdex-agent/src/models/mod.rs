//! Catalog domain models
//!
//! Sources, catalogued video files, and the durable jobs that drive all
//! agent work. These mirror the database rows one to one; everything else
//! in the agent is derived state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

/// A configured scan root.
#[derive(Debug, Clone, Serialize)]
pub struct Source {
    pub id: Uuid,
    pub kind: SourceKind,
    pub path: String,
    pub display_name: String,
    pub drive_nickname: Option<String>,
    /// Ingest-side library this source maps to, once resolved.
    pub cloud_library_id: Option<String>,
    /// Whether the backing drive is currently reachable.
    pub present: bool,
    pub created_at: DateTime<Utc>,
}

/// Kind of scan root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Folder,
    Gdrive,
    RemovableDisk,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Folder => "folder",
            SourceKind::Gdrive => "gdrive",
            SourceKind::RemovableDisk => "removable_disk",
        }
    }

    /// Parse a stored kind; anything unrecognized is treated as a plain
    /// local folder.
    pub fn from_db(s: &str) -> Self {
        match s {
            "gdrive" => SourceKind::Gdrive,
            "removable_disk" => SourceKind::RemovableDisk,
            _ => SourceKind::Folder,
        }
    }

    /// The `source_type` value the cloud ingest API expects for this kind.
    pub fn ingest_source_type(&self) -> &'static str {
        match self {
            SourceKind::Folder => "local",
            SourceKind::Gdrive => "gdrive",
            SourceKind::RemovableDisk => "removable_disk",
        }
    }
}

/// A catalogued video file, unique per (source, path).
#[derive(Debug, Clone, Serialize)]
pub struct VideoFile {
    pub id: Uuid,
    pub source_id: Uuid,
    pub path: String,
    pub filename: String,
    pub size: i64,
    pub mtime: DateTime<Utc>,
    /// Hex SHA-256 of the first 64 KiB of content.
    pub fingerprint: String,
    pub created_at: DateTime<Utc>,
}

impl VideoFile {
    /// Filename without its extension, used as the upload title.
    pub fn title_stem(&self) -> String {
        Path::new(&self.filename)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.filename.clone())
    }
}

/// A unit of orchestrated work in the durable queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Scan,
    Index,
    UploadScenes,
    GenerateThumbnails,
    /// A type this build does not understand (e.g. written by a newer
    /// agent); dispatched straight to `failed`.
    Unknown,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Scan => "scan",
            JobType::Index => "index",
            JobType::UploadScenes => "upload_scenes",
            JobType::GenerateThumbnails => "generate_thumbnails",
            JobType::Unknown => "unknown",
        }
    }

    pub fn from_db(s: &str) -> Self {
        match s {
            "scan" => JobType::Scan,
            "index" => JobType::Index,
            "upload_scenes" => JobType::UploadScenes,
            "generate_thumbnails" => JobType::GenerateThumbnails,
            _ => JobType::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "running" => Some(JobStatus::Running),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: Uuid,
    pub job_type: JobType,
    pub status: JobStatus,
    pub source_id: Option<Uuid>,
    pub file_id: Option<Uuid>,
    /// 0-100 for scan/index jobs; repurposed as the retry attempt counter
    /// for upload jobs.
    pub progress: i64,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// A fresh pending job with no source or file attached.
    pub fn pending(job_type: JobType) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            job_type,
            status: JobStatus::Pending,
            source_id: None,
            file_id: None,
            progress: 0,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Video extensions the scanner catalogs (lowercased, with dot).
pub const VIDEO_EXTENSIONS: [&str; 3] = [".mp4", ".mov", ".mkv"];

/// True when the filename has a recognized video extension, case-insensitive.
pub fn is_video_file(filename: &str) -> bool {
    match Path::new(filename).extension() {
        Some(ext) => {
            let ext = format!(".{}", ext.to_string_lossy().to_lowercase());
            VIDEO_EXTENSIONS.contains(&ext.as_str())
        }
        None => false,
    }
}
