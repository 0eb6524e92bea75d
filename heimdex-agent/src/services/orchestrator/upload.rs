//! Scene upload and retry workflow
//!
//! The first attempt runs inline right after an index job completes. A
//! retryable failure (5xx, network, timeout) materializes a pending
//! `upload_scenes` job whose `progress` column carries the attempt
//! counter; the poll loop re-dispatches it once the backoff window since
//! `updated_at` has elapsed. Permanent failures (other 4xx) are never
//! retried.

use super::JobOrchestrator;
use crate::cloud::{SceneIngestDoc, SceneIngestPayload, UploadError};
use crate::db;
use crate::models::{Job, JobStatus, JobType, Source, VideoFile};
use crate::pipelines::types::{SceneBoundary, SceneOutput};
use chrono::Utc;
use std::path::Path;
use std::time::Duration;

pub(crate) const MAX_UPLOAD_RETRIES: i64 = 5;
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Backoff before attempt `n` (0-based): 10 s · 3ⁿ, clamped to 10 min.
pub fn upload_backoff(attempt: i64) -> Duration {
    const BASE: Duration = Duration::from_secs(10);
    const CEILING: Duration = Duration::from_secs(600);

    if attempt <= 0 {
        return BASE;
    }
    let mut backoff = BASE;
    for _ in 0..attempt {
        backoff = backoff.saturating_mul(3);
        if backoff >= CEILING {
            return CEILING;
        }
    }
    backoff
}

enum PayloadOutcome {
    Ready(SceneIngestPayload),
    NoScenes,
}

/// First attempt, inline after index completion. Failures here never touch
/// the index job's status.
pub(crate) async fn inline_upload(
    o: &JobOrchestrator,
    job: &Job,
    file: &VideoFile,
    artifacts_base: &Path,
) {
    let payload = match build_payload(o, file, artifacts_base).await {
        Err(e) => {
            tracing::warn!(job_id = %job.id, error = %e, "scene upload skipped");
            return;
        }
        Ok(PayloadOutcome::NoScenes) => {
            tracing::info!(job_id = %job.id, "scene upload skipped: no scenes detected");
            return;
        }
        Ok(PayloadOutcome::Ready(payload)) => payload,
    };

    match attempt_upload(o, &payload).await {
        Ok(_) => {
            tracing::info!(
                job_id = %job.id,
                video_id = %payload.video_id,
                scene_count = payload.scenes.len(),
                "scene upload succeeded"
            );

            // Record a completed upload_scenes job so the startup backfill
            // won't create a duplicate upload for this file.
            let marker = Job {
                file_id: Some(file.id),
                status: JobStatus::Completed,
                ..Job::pending(JobType::UploadScenes)
            };
            if let Err(e) = db::jobs::create_job(&o.db, &marker).await {
                tracing::warn!(file_id = %file.id, error = %e, "failed to record upload job (non-critical)");
            }
        }
        Err(err) => {
            tracing::warn!(
                job_id = %job.id,
                video_id = %payload.video_id,
                error = %err,
                "scene upload failed (non-blocking)"
            );

            if !err.is_retryable() {
                tracing::warn!(
                    job_id = %job.id,
                    status_code = ?err.status_code(),
                    "scene upload permanent failure, no retry"
                );
                return;
            }

            let retry = Job {
                file_id: Some(file.id),
                error: Some(err.to_string()),
                ..Job::pending(JobType::UploadScenes)
            };
            match db::jobs::create_job(&o.db, &retry).await {
                Ok(()) => {
                    tracing::info!(retry_job_id = %retry.id, file_id = %file.id, "created upload retry job")
                }
                Err(e) => tracing::error!(error = %e, "failed to create upload retry job"),
            }
        }
    }
}

/// Retry worker for `upload_scenes` jobs.
pub(crate) async fn process_upload_job(o: &JobOrchestrator, job: &Job) {
    let delay = upload_backoff(job.progress);
    let elapsed = Utc::now() - job.updated_at;
    if elapsed.num_seconds() < delay.as_secs() as i64 {
        // Not due yet: leave the job pending, the next tick re-considers it.
        tracing::debug!(
            job_id = %job.id,
            attempt = job.progress,
            wait_remaining_s = delay.as_secs() as i64 - elapsed.num_seconds(),
            "upload retry not due yet"
        );
        return;
    }

    let attempt = job.progress + 1;
    if attempt > MAX_UPLOAD_RETRIES {
        o.mark_failed(
            job.id,
            &format!(
                "max retries ({MAX_UPLOAD_RETRIES}) exceeded: {}",
                job.error.as_deref().unwrap_or("")
            ),
        )
        .await;
        tracing::warn!(job_id = %job.id, attempts = attempt, "upload retry abandoned");
        return;
    }

    let Some(executor) = o.executor.clone() else {
        o.mark_failed(job.id, "pipeline runner not configured").await;
        return;
    };
    if o.cloud.is_none() {
        o.mark_failed(job.id, "cloud client not configured").await;
        return;
    }

    let Some(file_id) = job.file_id else {
        o.mark_failed(job.id, "file not found for retry").await;
        return;
    };
    let file = match db::files::get_file(&o.db, file_id).await {
        Ok(Some(file)) => file,
        _ => {
            o.mark_failed(job.id, "file not found for retry").await;
            return;
        }
    };

    o.mark_status(job.id, JobStatus::Running, None).await;
    o.set_progress(job.id, attempt).await;

    let artifacts_base = executor.artifacts_dir().join(file_id.to_string());

    // Rebuilt from disk every attempt so transient library-service
    // failures can heal between retries.
    let payload = match build_payload(o, &file, &artifacts_base).await {
        Err(e) => {
            o.mark_failed(job.id, &e).await;
            return;
        }
        Ok(PayloadOutcome::NoScenes) => {
            o.mark_status(job.id, JobStatus::Completed, None).await;
            return;
        }
        Ok(PayloadOutcome::Ready(payload)) => payload,
    };

    match attempt_upload(o, &payload).await {
        Ok(_) => {
            o.mark_status(job.id, JobStatus::Completed, None).await;
            tracing::info!(
                job_id = %job.id,
                attempt,
                video_id = %payload.video_id,
                "upload retry succeeded"
            );
        }
        Err(UploadError::Http { status, body }) if status < 500 => {
            o.mark_failed(job.id, &format!("permanent error (HTTP {status}): {body}")).await;
        }
        Err(err) => {
            tracing::warn!(job_id = %job.id, attempt, error = %err, "upload retry failed");
            o.mark_status(job.id, JobStatus::Pending, Some(&err.to_string())).await;
        }
    }
}

async fn attempt_upload(
    o: &JobOrchestrator,
    payload: &SceneIngestPayload,
) -> Result<(), UploadError> {
    let Some(cloud) = o.cloud.as_ref() else {
        return Err(UploadError::Network("cloud client not configured".into()));
    };

    match tokio::time::timeout(UPLOAD_TIMEOUT, cloud.upload_scenes(payload)).await {
        Err(_) => Err(UploadError::Timeout(UPLOAD_TIMEOUT)),
        Ok(result) => result.map(|_| ()),
    }
}

/// Read and parse the on-disk scene artifact, resolve the target library,
/// and assemble the ingest payload. Error strings are user-facing job
/// errors.
async fn build_payload(
    o: &JobOrchestrator,
    file: &VideoFile,
    artifacts_base: &Path,
) -> Result<PayloadOutcome, String> {
    let scene_path = artifacts_base.join("scenes").join("result.json");

    let data = tokio::fs::read(&scene_path)
        .await
        .map_err(|e| format!("cannot read scene output: {e}"))?;
    let output: SceneOutput =
        serde_json::from_slice(&data).map_err(|e| format!("invalid scene JSON: {e}"))?;

    if output.scenes.is_empty() {
        return Ok(PayloadOutcome::NoScenes);
    }

    let source = db::sources::get_source(&o.db, file.source_id).await.ok().flatten();
    let library_id = resolve_library_id(o, source.as_ref())
        .await
        .map_err(|e| format!("no library available: {e}"))?;

    let source_type = source
        .as_ref()
        .map(|s| s.kind.ingest_source_type())
        .unwrap_or("local");

    Ok(PayloadOutcome::Ready(SceneIngestPayload {
        video_id: output.video_id.clone(),
        video_title: file.title_stem(),
        library_id,
        pipeline_version: output.meta.pipeline_version.clone(),
        model_version: output.meta.model_version.clone(),
        total_duration_ms: output.total_duration_ms,
        scenes: build_scene_docs(&output.scenes, source_type),
    }))
}

/// Single mapping point from pipeline scene output to the ingest document;
/// every field the service accepts is forwarded here.
fn build_scene_docs(scenes: &[SceneBoundary], source_type: &str) -> Vec<SceneIngestDoc> {
    scenes
        .iter()
        .map(|s| SceneIngestDoc {
            scene_id: s.scene_id.clone(),
            index: s.index,
            start_ms: s.start_ms,
            end_ms: s.end_ms,
            keyframe_timestamp_ms: s.keyframe_timestamp_ms,
            transcript_raw: s.transcript_raw.clone(),
            speech_segment_count: s.speech_segment_count,
            people_cluster_ids: s.people_cluster_ids.clone(),
            keyword_tags: s.keyword_tags.clone(),
            product_tags: s.product_tags.clone(),
            product_entities: s.product_entities.clone(),
            ocr_text_raw: s.ocr_text_raw.clone(),
            ocr_char_count: s.ocr_char_count,
            source_type: source_type.to_string(),
        })
        .collect()
}

/// Cached mapping first, then library auto-create (persisted back onto the
/// source), then the configured fallback.
async fn resolve_library_id(
    o: &JobOrchestrator,
    source: Option<&Source>,
) -> Result<String, String> {
    if let Some(source) = source {
        if let Some(id) = source.cloud_library_id.as_deref() {
            if !id.is_empty() {
                return Ok(id.to_string());
            }
        }
    }

    if let (Some(cloud), Some(source)) = (o.cloud.as_ref(), source) {
        match cloud.get_or_create_library(&source.display_name).await {
            Ok(library) => {
                match db::sources::update_source_cloud_library_id(&o.db, source.id, &library.id)
                    .await
                {
                    Ok(()) => tracing::info!(
                        source_id = %source.id,
                        source_name = %source.display_name,
                        library_id = %library.id,
                        created = library.created,
                        "library resolved for source"
                    ),
                    Err(e) => tracing::warn!(
                        source_id = %source.id,
                        error = %e,
                        "failed to store library mapping"
                    ),
                }
                return Ok(library.id);
            }
            Err(e) => {
                tracing::warn!(
                    source_id = %source.id,
                    source_name = %source.display_name,
                    error = %e,
                    "library auto-create failed, using fallback"
                );
            }
        }
    }

    if let Some(fallback) = o.cfg.fallback_library_id.as_deref() {
        if !fallback.is_empty() {
            return Ok(fallback.to_string());
        }
    }

    Err("source has no mapping and no fallback configured".to_string())
}
