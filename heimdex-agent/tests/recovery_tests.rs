//! Crash recovery and startup backfill tests: no job stays `running`
//! across process lifetimes, and the backfill passes are idempotent.

mod helpers;

use helpers::*;
use heimdex_agent::cloud::CloudIngest;
use heimdex_agent::models::{Job, JobStatus, JobType, SourceKind};
use heimdex_agent::pipelines::{CachedDoctor, PipelineExecutor};
use heimdex_agent::services::{CatalogService, JobOrchestrator, OrchestratorConfig, Thumbnailer};
use std::sync::Arc;

#[tokio::test]
async fn running_jobs_are_failed_on_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("heimdex.db");

    let db = heimdex_common::db::init_database(&db_path).await.unwrap();
    let source = seed_source(&db, SourceKind::Folder).await;
    let file = seed_file(&db, source.id, "clip.mp4").await;

    let mut job = Job {
        source_id: Some(source.id),
        file_id: Some(file.id),
        ..Job::pending(JobType::Index)
    };
    job.status = JobStatus::Running;
    job.progress = 33;
    seed_job(&db, &job).await;
    db.close().await;

    // Simulated restart: reopening the database runs the sweep.
    let db = heimdex_common::db::init_database(&db_path).await.unwrap();

    let job = load_job(&db, job.id).await;
    assert_status(&job, JobStatus::Failed);
    assert_eq!(job.error.as_deref(), Some("interrupted by restart"));

    let running = heimdex_agent::db::jobs::count_jobs_with_status(&db, JobStatus::Running)
        .await
        .unwrap();
    assert_eq!(running, 0);
}

struct BackfillHarness {
    _dir: tempfile::TempDir,
    db: sqlx::SqlitePool,
    executor: Arc<MockExecutor>,
    orchestrator: JobOrchestrator,
}

async fn backfill_harness() -> BackfillHarness {
    let dir = tempfile::tempdir().unwrap();
    let db = scratch_db(&dir).await;

    let executor = Arc::new(MockExecutor::new(&dir.path().join("artifacts")));
    let dyn_executor: Arc<dyn PipelineExecutor> = executor.clone();
    let doctor = Arc::new(CachedDoctor::new(dyn_executor.clone()));

    let cloud: Arc<dyn CloudIngest> = Arc::new(MockCloud::new());
    let thumbnailer: Arc<dyn Thumbnailer> = Arc::new(MockThumbnailer::new());

    let orchestrator = JobOrchestrator::new(
        db.clone(),
        CatalogService::new(db.clone()),
        OrchestratorConfig::default(),
    )
    .with_pipelines(dyn_executor, doctor)
    .with_cloud(cloud)
    .with_thumbnailer(thumbnailer);

    BackfillHarness {
        _dir: dir,
        db,
        executor,
        orchestrator,
    }
}

async fn completed_index_job(db: &sqlx::SqlitePool, file: &heimdex_agent::models::VideoFile) {
    let mut job = Job {
        source_id: Some(file.source_id),
        file_id: Some(file.id),
        ..Job::pending(JobType::Index)
    };
    job.status = JobStatus::Completed;
    job.progress = 100;
    seed_job(db, &job).await;
}

#[tokio::test]
async fn upload_backfill_creates_jobs_for_unuploaded_artifacts() {
    let h = backfill_harness().await;
    let source = seed_source(&h.db, SourceKind::Folder).await;

    // Indexed with an artifact on disk but never uploaded: backfilled.
    let missing_upload = seed_file(&h.db, source.id, "a.mp4").await;
    completed_index_job(&h.db, &missing_upload).await;
    write_scene_artifact(h.executor.artifacts_dir(), missing_upload.id, 2);

    // Indexed and already uploaded: not touched.
    let already_uploaded = seed_file(&h.db, source.id, "b.mp4").await;
    completed_index_job(&h.db, &already_uploaded).await;
    write_scene_artifact(h.executor.artifacts_dir(), already_uploaded.id, 2);
    let mut marker = Job {
        file_id: Some(already_uploaded.id),
        ..Job::pending(JobType::UploadScenes)
    };
    marker.status = JobStatus::Completed;
    seed_job(&h.db, &marker).await;

    // Indexed but no artifact on disk: nothing to upload.
    let no_artifact = seed_file(&h.db, source.id, "c.mp4").await;
    completed_index_job(&h.db, &no_artifact).await;

    h.orchestrator.run_startup_backfills().await;

    let uploads = jobs_of_type(&h.db, JobType::UploadScenes).await;
    let pending: Vec<_> = uploads
        .iter()
        .filter(|j| j.status == JobStatus::Pending)
        .collect();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].file_id, Some(missing_upload.id));
    assert_eq!(pending[0].progress, 0);
}

#[tokio::test]
async fn backfills_are_idempotent() {
    let h = backfill_harness().await;
    let source = seed_source(&h.db, SourceKind::Folder).await;
    let file = seed_file(&h.db, source.id, "a.mp4").await;
    completed_index_job(&h.db, &file).await;
    write_scene_artifact(h.executor.artifacts_dir(), file.id, 2);

    h.orchestrator.run_startup_backfills().await;
    h.orchestrator.run_startup_backfills().await;

    let uploads = jobs_of_type(&h.db, JobType::UploadScenes).await;
    assert_eq!(uploads.len(), 1, "second pass must not duplicate");

    let thumbs = jobs_of_type(&h.db, JobType::GenerateThumbnails).await;
    assert_eq!(thumbs.len(), 1);
}

#[tokio::test]
async fn thumbnail_backfill_skips_populated_directories() {
    let h = backfill_harness().await;
    let source = seed_source(&h.db, SourceKind::Folder).await;

    let needs_thumbs = seed_file(&h.db, source.id, "a.mp4").await;
    write_scene_artifact(h.executor.artifacts_dir(), needs_thumbs.id, 2);

    let has_thumbs = seed_file(&h.db, source.id, "b.mp4").await;
    write_scene_artifact(h.executor.artifacts_dir(), has_thumbs.id, 2);
    let thumb = h
        .executor
        .artifacts_dir()
        .join(has_thumbs.id.to_string())
        .join("thumbnails")
        .join("x.jpg");
    write_json(&thumb, "jpeg");

    h.orchestrator.run_startup_backfills().await;

    let thumbs = jobs_of_type(&h.db, JobType::GenerateThumbnails).await;
    assert_eq!(thumbs.len(), 1);
    assert_eq!(thumbs[0].file_id, Some(needs_thumbs.id));
}

#[tokio::test]
async fn restart_scenario_end_to_end() {
    // A process dies while an index job runs; an older file's upload never
    // happened. On restart the running job is swept and the upload is
    // backfilled; a second orchestrator start adds nothing.
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("heimdex.db");
    let artifacts = dir.path().join("artifacts");

    let db = heimdex_common::db::init_database(&db_path).await.unwrap();
    let source = seed_source(&db, SourceKind::Folder).await;

    let interrupted = seed_file(&db, source.id, "interrupted.mp4").await;
    let mut running = Job {
        source_id: Some(source.id),
        file_id: Some(interrupted.id),
        ..Job::pending(JobType::Index)
    };
    running.status = JobStatus::Running;
    seed_job(&db, &running).await;

    let unuploaded = seed_file(&db, source.id, "unuploaded.mp4").await;
    completed_index_job(&db, &unuploaded).await;
    db.close().await;

    let db = heimdex_common::db::init_database(&db_path).await.unwrap();

    let swept = load_job(&db, running.id).await;
    assert_status(&swept, JobStatus::Failed);
    assert_eq!(swept.error.as_deref(), Some("interrupted by restart"));

    let executor = Arc::new(MockExecutor::new(&artifacts));
    write_scene_artifact(&artifacts, unuploaded.id, 2);
    let dyn_executor: Arc<dyn PipelineExecutor> = executor.clone();
    let doctor = Arc::new(CachedDoctor::new(dyn_executor.clone()));
    let cloud: Arc<dyn CloudIngest> = Arc::new(MockCloud::new());

    let orchestrator = JobOrchestrator::new(
        db.clone(),
        CatalogService::new(db.clone()),
        OrchestratorConfig::default(),
    )
    .with_pipelines(dyn_executor, doctor)
    .with_cloud(cloud);

    orchestrator.run_startup_backfills().await;
    let uploads = jobs_of_type(&db, JobType::UploadScenes).await;
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].file_id, Some(unuploaded.id));

    orchestrator.run_startup_backfills().await;
    assert_eq!(jobs_of_type(&db, JobType::UploadScenes).await.len(), 1);
}
