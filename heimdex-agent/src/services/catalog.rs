//! Catalog service
//!
//! Manages sources and catalogued files, and executes scan jobs: walk the
//! source root, fingerprint and upsert every video, then materialize one
//! pending index job per file that has never been indexed.

use crate::db;
use crate::models::{Job, JobStatus, JobType, Source, SourceKind, VideoFile};
use crate::services::scanner;
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const JOB_SCAN_LIMIT: i64 = 10_000;

#[derive(Clone)]
pub struct CatalogService {
    db: SqlitePool,
}

impl CatalogService {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Register a folder as a scan root. Adding a path that is already
    /// registered returns the existing source.
    pub async fn add_folder(&self, path: &str, display_name: Option<String>) -> Result<Source> {
        let abs_path = std::fs::canonicalize(path)
            .map_err(|e| anyhow!("path does not exist: {e}"))?;
        if !abs_path.is_dir() {
            return Err(anyhow!("path is not a directory"));
        }
        let abs_path = abs_path.to_string_lossy().into_owned();

        if let Some(existing) = db::sources::get_source_by_path(&self.db, &abs_path).await? {
            return Ok(existing);
        }

        let display_name = display_name.filter(|n| !n.is_empty()).unwrap_or_else(|| {
            Path::new(&abs_path)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| abs_path.clone())
        });

        let source = Source {
            id: Uuid::new_v4(),
            kind: SourceKind::Folder,
            path: abs_path,
            display_name,
            drive_nickname: None,
            cloud_library_id: None,
            present: true,
            created_at: Utc::now(),
        };

        db::sources::create_source(&self.db, &source).await?;
        tracing::info!(source_id = %source.id, path = %source.path, "folder added");

        Ok(source)
    }

    /// Delete a source and every file catalogued under it.
    pub async fn remove_source(&self, id: Uuid) -> Result<()> {
        db::files::delete_files_by_source(&self.db, id).await?;
        db::sources::delete_source(&self.db, id).await?;
        Ok(())
    }

    pub async fn get_sources(&self) -> Result<Vec<Source>> {
        db::sources::list_sources(&self.db).await
    }

    pub async fn get_source(&self, id: Uuid) -> Result<Option<Source>> {
        db::sources::get_source(&self.db, id).await
    }

    pub async fn get_files(&self, source_id: Uuid) -> Result<Vec<VideoFile>> {
        db::files::list_files_by_source(&self.db, source_id).await
    }

    pub async fn get_file(&self, id: Uuid) -> Result<Option<VideoFile>> {
        db::files::get_file(&self.db, id).await
    }

    pub async fn count_files(&self) -> Result<i64> {
        db::files::count_files(&self.db).await
    }

    /// Queue a scan of the given source.
    pub async fn scan_source(&self, source_id: Uuid) -> Result<Job> {
        let source = db::sources::get_source(&self.db, source_id)
            .await?
            .ok_or_else(|| anyhow!("source not found"))?;

        let job = Job {
            source_id: Some(source.id),
            ..Job::pending(JobType::Scan)
        };
        db::jobs::create_job(&self.db, &job).await?;

        tracing::info!(job_id = %job.id, source_id = %source_id, "scan job created");
        Ok(job)
    }

    /// Run a scan job to completion: walk, fingerprint, upsert, then
    /// materialize index jobs for newly catalogued files.
    pub async fn execute_scan(
        &self,
        job_id: Uuid,
        source_id: Uuid,
        root: &Path,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.set_status(job_id, JobStatus::Running, None).await;
        tracing::info!(job_id = %job_id, path = %root.display(), "starting scan");

        let files = match scanner::discover_videos(root) {
            Ok(files) => files,
            Err(e) => {
                if matches!(
                    e,
                    scanner::ScanError::PathNotFound(_) | scanner::ScanError::NotADirectory(_)
                ) {
                    tracing::warn!(
                        source_id = %source_id,
                        error = %e,
                        "scan root unreachable, marking source not present"
                    );
                    self.set_present(source_id, false).await;
                }
                self.set_status(job_id, JobStatus::Failed, Some(&e.to_string())).await;
                return Err(e.into());
            }
        };

        // A reachable root means the drive is back, whatever the flag said.
        self.set_present(source_id, true).await;

        let total = files.len();
        tracing::info!(job_id = %job_id, count = total, "found video files");

        for (i, path) in files.iter().enumerate() {
            if cancel.is_cancelled() {
                self.set_status(job_id, JobStatus::Failed, Some("cancelled")).await;
                return Err(anyhow!("cancelled"));
            }

            if let Err(e) = self.process_file(source_id, path).await {
                tracing::warn!(path = %path.display(), error = %e, "failed to process file");
            }

            let progress = ((i + 1) * 100 / total) as i64;
            if let Err(e) = db::jobs::update_job_progress(&self.db, job_id, progress).await {
                tracing::warn!(job_id = %job_id, error = %e, "failed to update scan progress");
            }
        }

        if total == 0 {
            if let Err(e) = db::jobs::update_job_progress(&self.db, job_id, 100).await {
                tracing::warn!(job_id = %job_id, error = %e, "failed to update scan progress");
            }
        }

        self.set_status(job_id, JobStatus::Completed, None).await;
        tracing::info!(job_id = %job_id, files_processed = total, "scan completed");

        self.create_index_jobs(source_id).await;
        Ok(())
    }

    /// One pending index job per file of this source that has no
    /// pending/running/completed index job yet. Failed index jobs do not
    /// count, so a re-scan retries them.
    async fn create_index_jobs(&self, source_id: Uuid) {
        let files = match db::files::list_files_by_source(&self.db, source_id).await {
            Ok(files) => files,
            Err(e) => {
                tracing::error!(source_id = %source_id, error = %e, "failed to list files for index job creation");
                return;
            }
        };

        let existing = match db::jobs::list_jobs(&self.db, JOB_SCAN_LIMIT).await {
            Ok(jobs) => jobs,
            Err(e) => {
                tracing::error!(error = %e, "failed to list existing jobs");
                return;
            }
        };

        let mut indexed: HashSet<Uuid> = HashSet::new();
        for job in existing {
            if job.job_type == JobType::Index
                && matches!(
                    job.status,
                    JobStatus::Pending | JobStatus::Running | JobStatus::Completed
                )
            {
                if let Some(file_id) = job.file_id {
                    indexed.insert(file_id);
                }
            }
        }

        let mut created = 0;
        for file in files {
            if indexed.contains(&file.id) {
                continue;
            }
            let job = Job {
                source_id: Some(source_id),
                file_id: Some(file.id),
                ..Job::pending(JobType::Index)
            };
            if let Err(e) = db::jobs::create_job(&self.db, &job).await {
                tracing::warn!(file_id = %file.id, error = %e, "failed to create index job");
                continue;
            }
            created += 1;
        }

        tracing::info!(source_id = %source_id, count = created, "created index jobs");
    }

    async fn process_file(&self, source_id: Uuid, path: &Path) -> Result<()> {
        let metadata = std::fs::metadata(path)?;
        let mtime: DateTime<Utc> = metadata.modified()?.into();
        let fingerprint = scanner::compute_fingerprint(path)?;

        let file = VideoFile {
            id: Uuid::new_v4(),
            source_id,
            path: path.to_string_lossy().into_owned(),
            filename: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            size: metadata.len() as i64,
            mtime,
            fingerprint,
            created_at: Utc::now(),
        };

        db::files::upsert_file(&self.db, &file).await
    }

    async fn set_status(&self, job_id: Uuid, status: JobStatus, error: Option<&str>) {
        if let Err(e) = db::jobs::update_job_status(&self.db, job_id, status, error).await {
            tracing::warn!(job_id = %job_id, error = %e, "failed to update job status");
        }
    }

    async fn set_present(&self, source_id: Uuid, present: bool) {
        if let Err(e) = db::sources::update_source_present(&self.db, source_id, present).await {
            tracing::warn!(source_id = %source_id, error = %e, "failed to update source presence");
        }
    }
}
