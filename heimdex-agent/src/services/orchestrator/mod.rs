//! Job orchestrator
//!
//! Owns the durable queue's poll loop. Every tick dispatches the oldest
//! pending job; exactly one job runs at a time on the device. The index
//! workflow runs speech first and then faces and scenes in parallel,
//! upload jobs reconcile the cloud with bounded exponential backoff, and
//! two idempotent backfill passes run once at startup.

mod backfill;
mod index;
mod thumbs;
mod upload;

pub use upload::upload_backoff;

use crate::cloud::CloudIngest;
use crate::db;
use crate::models::{JobStatus, JobType};
use crate::pipelines::{CachedDoctor, PipelineExecutor};
use crate::services::{CatalogService, Thumbnailer};
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub poll_interval: Duration,
    /// Library used when per-source resolution fails.
    pub fallback_library_id: Option<String>,
    pub ocr_enabled: bool,
    pub ocr_redact_pii: bool,
    /// Advanced: launch faces alongside speech instead of after it.
    pub faces_parallel_with_speech: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            fallback_library_id: None,
            ocr_enabled: false,
            ocr_redact_pii: false,
            faces_parallel_with_speech: false,
        }
    }
}

pub struct JobOrchestrator {
    db: SqlitePool,
    catalog: CatalogService,
    cfg: OrchestratorConfig,
    executor: Option<Arc<dyn PipelineExecutor>>,
    doctor: Option<Arc<CachedDoctor>>,
    cloud: Option<Arc<dyn CloudIngest>>,
    thumbnailer: Option<Arc<dyn Thumbnailer>>,
    paused: AtomicBool,
    running: AtomicBool,
}

impl JobOrchestrator {
    pub fn new(db: SqlitePool, catalog: CatalogService, cfg: OrchestratorConfig) -> Self {
        Self {
            db,
            catalog,
            cfg,
            executor: None,
            doctor: None,
            cloud: None,
            thumbnailer: None,
            paused: AtomicBool::new(false),
            running: AtomicBool::new(false),
        }
    }

    /// Attach the pipeline executor and its capability doctor. Without
    /// them, index jobs fail fast instead of queueing forever.
    pub fn with_pipelines(
        mut self,
        executor: Arc<dyn PipelineExecutor>,
        doctor: Arc<CachedDoctor>,
    ) -> Self {
        self.executor = Some(executor);
        self.doctor = Some(doctor);
        self
    }

    /// Attach the cloud ingest client; scene uploads are skipped silently
    /// when absent.
    pub fn with_cloud(mut self, cloud: Arc<dyn CloudIngest>) -> Self {
        self.cloud = Some(cloud);
        self
    }

    pub fn with_thumbnailer(mut self, thumbnailer: Arc<dyn Thumbnailer>) -> Self {
        self.thumbnailer = Some(thumbnailer);
        self
    }

    /// Run the poll loop until `cancel` fires. Startup backfills run once
    /// before the first tick.
    pub async fn run(&self, cancel: CancellationToken) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        tracing::info!("job runner started");

        self.run_startup_backfills().await;

        let mut ticker = tokio::time::interval(self.cfg.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("job runner stopping");
                    self.running.store(false, Ordering::SeqCst);
                    return;
                }
                _ = ticker.tick() => {
                    if !self.paused.load(Ordering::SeqCst) {
                        self.tick(&cancel).await;
                    }
                }
            }
        }
    }

    /// One-shot best-effort passes that recreate work lost before a
    /// restart. Safe to re-run; the has-any-job-of-that-type guards
    /// prevent duplicates.
    pub async fn run_startup_backfills(&self) {
        if self.cloud.is_some() && self.executor.is_some() {
            backfill::backfill_uploads(self).await;
        }
        if self.executor.is_some() && self.thumbnailer.is_some() {
            backfill::backfill_thumbnails(self).await;
        }
    }

    /// Dispatch the oldest pending job, if any.
    pub async fn tick(&self, cancel: &CancellationToken) {
        let jobs = match db::jobs::list_pending_jobs(&self.db).await {
            Ok(jobs) => jobs,
            Err(e) => {
                tracing::error!(error = %e, "failed to list pending jobs");
                return;
            }
        };

        let Some(job) = jobs.into_iter().next() else {
            return;
        };

        tracing::info!(job_id = %job.id, job_type = job.job_type.as_str(), "processing job");

        match job.job_type {
            JobType::Scan => {
                let source = match job.source_id {
                    Some(id) => self.catalog.get_source(id).await.ok().flatten(),
                    None => None,
                };
                let Some(source) = source else {
                    self.mark_failed(job.id, "source not found").await;
                    return;
                };

                if let Err(e) = self
                    .catalog
                    .execute_scan(job.id, source.id, Path::new(&source.path), cancel)
                    .await
                {
                    tracing::error!(job_id = %job.id, error = %e, "scan failed");
                }
            }
            JobType::Index => index::process_index_job(self, &job, cancel).await,
            JobType::UploadScenes => upload::process_upload_job(self, &job).await,
            JobType::GenerateThumbnails => thumbs::process_thumbnail_job(self, &job).await,
            JobType::Unknown => {
                tracing::warn!(job_id = %job.id, "unknown job type");
                self.mark_failed(job.id, "unknown job type").await;
            }
        }
    }

    /// Pause dispatch at the next tick; the in-flight job is not
    /// interrupted.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
        tracing::info!("job runner paused");
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        tracing::info!("job runner resumed");
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub(crate) async fn mark_status(&self, job_id: Uuid, status: JobStatus, error: Option<&str>) {
        if let Err(e) = db::jobs::update_job_status(&self.db, job_id, status, error).await {
            tracing::warn!(job_id = %job_id, error = %e, "failed to update job status");
        }
    }

    pub(crate) async fn mark_failed(&self, job_id: Uuid, message: &str) {
        self.mark_status(job_id, JobStatus::Failed, Some(message)).await;
    }

    pub(crate) async fn set_progress(&self, job_id: Uuid, progress: i64) {
        if let Err(e) = db::jobs::update_job_progress(&self.db, job_id, progress).await {
            tracing::warn!(job_id = %job_id, error = %e, "failed to update job progress");
        }
    }
}
