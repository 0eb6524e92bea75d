//! Startup backfill passes
//!
//! One-shot, idempotent sweeps that recreate work the previous process
//! never got to: upload jobs for files indexed before cloud sync was
//! enabled (or lost to a crash), and thumbnail jobs for scene artifacts
//! with no thumbnails yet. The "has any job of that type" guards make
//! re-runs produce nothing new.

use super::JobOrchestrator;
use crate::db;
use crate::models::{Job, JobStatus, JobType};
use std::collections::HashSet;
use uuid::Uuid;

const UPLOAD_BACKFILL_JOB_LIMIT: i64 = 10_000;
const THUMBNAIL_BACKFILL_JOB_LIMIT: i64 = 1_000;

/// Create a pending `upload_scenes` job for every file whose index job
/// completed, that has no upload job of any status, and whose scene
/// artifact is present on disk.
pub(crate) async fn backfill_uploads(o: &JobOrchestrator) {
    let Some(executor) = o.executor.as_ref() else {
        return;
    };

    let jobs = match db::jobs::list_jobs(&o.db, UPLOAD_BACKFILL_JOB_LIMIT).await {
        Ok(jobs) => jobs,
        Err(e) => {
            tracing::warn!(error = %e, "backfill: cannot list jobs");
            return;
        }
    };

    let mut completed_index: HashSet<Uuid> = HashSet::new();
    let mut has_upload: HashSet<Uuid> = HashSet::new();
    for job in &jobs {
        let Some(file_id) = job.file_id else { continue };
        if job.job_type == JobType::Index && job.status == JobStatus::Completed {
            completed_index.insert(file_id);
        }
        if job.job_type == JobType::UploadScenes {
            has_upload.insert(file_id);
        }
    }

    let mut created = 0;
    for file_id in &completed_index {
        if has_upload.contains(file_id) {
            continue;
        }
        let scene_path = executor
            .artifacts_dir()
            .join(file_id.to_string())
            .join("scenes")
            .join("result.json");
        if !scene_path.exists() {
            continue;
        }

        let job = Job {
            file_id: Some(*file_id),
            ..Job::pending(JobType::UploadScenes)
        };
        if let Err(e) = db::jobs::create_job(&o.db, &job).await {
            tracing::warn!(file_id = %file_id, error = %e, "backfill: cannot create upload job");
            continue;
        }
        created += 1;
    }

    tracing::info!(
        completed_index_jobs = completed_index.len(),
        already_uploaded = has_upload.len(),
        created,
        "backfill: scan complete"
    );
}

/// Create a pending `generate_thumbnails` job for every file with a scene
/// artifact, no thumbnail job of any status, and an empty (or missing)
/// thumbnail directory.
pub(crate) async fn backfill_thumbnails(o: &JobOrchestrator) {
    let Some(executor) = o.executor.as_ref() else {
        return;
    };

    let files = match db::files::list_files(&o.db).await {
        Ok(files) => files,
        Err(e) => {
            tracing::warn!(error = %e, "thumbnail backfill: cannot list files");
            return;
        }
    };

    let jobs = match db::jobs::list_jobs(&o.db, THUMBNAIL_BACKFILL_JOB_LIMIT).await {
        Ok(jobs) => jobs,
        Err(_) => return,
    };

    let mut has_thumb_job: HashSet<Uuid> = HashSet::new();
    for job in &jobs {
        if job.job_type == JobType::GenerateThumbnails {
            if let Some(file_id) = job.file_id {
                has_thumb_job.insert(file_id);
            }
        }
    }

    for file in files {
        if has_thumb_job.contains(&file.id) {
            continue;
        }

        let file_artifacts = executor.artifacts_dir().join(file.id.to_string());
        if !file_artifacts.join("scenes").join("result.json").exists() {
            continue;
        }

        let thumb_dir = file_artifacts.join("thumbnails");
        if let Ok(mut entries) = std::fs::read_dir(&thumb_dir) {
            if entries.next().is_some() {
                continue;
            }
        }

        let job = Job {
            file_id: Some(file.id),
            ..Job::pending(JobType::GenerateThumbnails)
        };
        if let Err(e) = db::jobs::create_job(&o.db, &job).await {
            tracing::warn!(file_id = %file.id, error = %e, "thumbnail backfill: create job failed");
        }
    }
}
