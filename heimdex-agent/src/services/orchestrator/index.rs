//! Index workflow
//!
//! Speech runs first because scenes aggregate its transcript. Faces and
//! scenes then fan out as parallel workers reporting into a bounded
//! channel sized to the worker count, so workers never block on send. On
//! the first step error the child cancellation scope is cancelled, which
//! kills the sibling subprocess promptly, but the channel is always
//! drained to completion so no worker leaks.

use super::JobOrchestrator;
use crate::db;
use crate::models::{Job, JobStatus};
use crate::pipelines::runner::{tail_str, PipelineExecutor, ScenesRequest};
use crate::services::orchestrator::upload;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

struct StepOutcome {
    name: &'static str,
    error: Option<String>,
}

pub(crate) async fn process_index_job(
    o: &JobOrchestrator,
    job: &Job,
    cancel: &CancellationToken,
) {
    let (Some(executor), Some(doctor)) = (o.executor.clone(), o.doctor.clone()) else {
        o.mark_failed(job.id, "pipeline runner not configured").await;
        return;
    };

    if cancel.is_cancelled() {
        o.mark_failed(job.id, "index job cancelled").await;
        return;
    }

    let Some(file_id) = job.file_id else {
        o.mark_failed(job.id, "file not found").await;
        return;
    };
    let file = match db::files::get_file(&o.db, file_id).await {
        Ok(Some(file)) => file,
        _ => {
            o.mark_failed(job.id, "file not found").await;
            return;
        }
    };

    o.mark_status(job.id, JobStatus::Running, None).await;

    let caps = match doctor.get(cancel).await {
        Ok(caps) => caps,
        Err(e) => {
            o.mark_failed(job.id, &format!("doctor probe failed: {e}")).await;
            return;
        }
    };

    if !caps.any_available() {
        o.mark_failed(job.id, "no pipeline capabilities available").await;
        return;
    }

    let artifacts_base = executor.artifacts_dir().join(file_id.to_string());
    let total_steps =
        caps.has_speech as i64 + caps.has_faces as i64 + caps.has_scenes as i64;
    let mut completed_steps = 0i64;

    let child = cancel.child_token();
    let (tx, mut rx) = mpsc::channel::<StepOutcome>(2);

    let video_path = PathBuf::from(&file.path);
    let speech_out = artifacts_base.join("speech").join("result.json");

    // Faces does not consume speech output, so in advanced mode it may
    // start while speech is still running.
    let mut faces_launched = false;
    if o.cfg.faces_parallel_with_speech && caps.has_faces && caps.has_speech {
        spawn_faces(
            job.id,
            file_id,
            executor.clone(),
            video_path.clone(),
            artifacts_base.clone(),
            child.clone(),
            tx.clone(),
        );
        faces_launched = true;
    }

    // Phase 1: speech, the prerequisite for scenes.
    let mut speech_ok = false;
    if caps.has_speech {
        tracing::info!(job_id = %job.id, file_id = %file_id, "running speech pipeline");

        let failure = match executor
            .run_speech(&video_path, &speech_out, child.clone())
            .await
        {
            Err(e) => Some(format!("speech pipeline error: {e}")),
            Ok(result) if !result.is_success() => Some(format!(
                "speech pipeline exited {}: {}",
                result.exit_code,
                tail_str(&result.stderr_tail, 512)
            )),
            Ok(result) => match executor.validate_output(&speech_out) {
                Err(e) => Some(format!("speech output invalid: {e}")),
                Ok(_) => {
                    speech_ok = true;
                    completed_steps += 1;
                    o.set_progress(job.id, completed_steps * 100 / total_steps).await;
                    tracing::info!(
                        job_id = %job.id,
                        duration_ms = result.duration.as_millis() as u64,
                        "speech pipeline completed"
                    );
                    None
                }
            },
        };

        if let Some(message) = failure {
            // An early faces worker may be in flight; it must be cancelled
            // and drained before the job concludes.
            child.cancel();
            drop(tx);
            while rx.recv().await.is_some() {}
            o.mark_failed(job.id, &message).await;
            return;
        }
    }

    // Phase 2: faces and scenes in parallel.
    if caps.has_faces && !faces_launched {
        spawn_faces(
            job.id,
            file_id,
            executor.clone(),
            video_path.clone(),
            artifacts_base.clone(),
            child.clone(),
            tx.clone(),
        );
    }
    if caps.has_scenes && speech_ok {
        spawn_scenes(
            job.id,
            file_id,
            executor.clone(),
            video_path,
            artifacts_base.clone(),
            speech_out,
            o.cfg.ocr_enabled,
            o.cfg.ocr_redact_pii,
            child.clone(),
            tx.clone(),
        );
    }
    drop(tx);

    // Fan-in: drain until every launched worker has reported, even after
    // deciding to fail.
    let mut first_err: Option<String> = None;
    while let Some(outcome) = rx.recv().await {
        match outcome.error {
            Some(error) => {
                if first_err.is_none() {
                    tracing::warn!(
                        job_id = %job.id,
                        step = outcome.name,
                        error = %error,
                        "pipeline step failed, cancelling sibling"
                    );
                    first_err = Some(error);
                    child.cancel();
                }
            }
            None => {
                if first_err.is_none() {
                    completed_steps += 1;
                    o.set_progress(job.id, completed_steps * 100 / total_steps).await;
                }
            }
        }
    }

    if let Some(error) = first_err {
        o.mark_failed(job.id, &error).await;
        return;
    }

    o.set_progress(job.id, 100).await;
    o.mark_status(job.id, JobStatus::Completed, None).await;
    tracing::info!(job_id = %job.id, file_id = %file_id, "index job completed");

    // Non-blocking with respect to job status: the index job is already
    // completed, whatever the upload outcome.
    if o.cloud.is_some() && caps.has_scenes && speech_ok {
        upload::inline_upload(o, job, &file, &artifacts_base).await;
    }
}

fn spawn_faces(
    job_id: Uuid,
    file_id: Uuid,
    executor: Arc<dyn PipelineExecutor>,
    video: PathBuf,
    artifacts_base: PathBuf,
    cancel: CancellationToken,
    tx: mpsc::Sender<StepOutcome>,
) {
    tokio::spawn(async move {
        let out = artifacts_base.join("faces").join("result.json");
        tracing::info!(job_id = %job_id, file_id = %file_id, "running faces pipeline");

        let error = match executor.run_faces(&video, &out, cancel).await {
            Err(e) => Some(format!("faces pipeline error: {e}")),
            Ok(result) if !result.is_success() => Some(format!(
                "faces pipeline exited {}: {}",
                result.exit_code,
                tail_str(&result.stderr_tail, 512)
            )),
            Ok(result) => match executor.validate_output(&out) {
                Err(e) => Some(format!("faces output invalid: {e}")),
                Ok(_) => {
                    tracing::info!(
                        job_id = %job_id,
                        duration_ms = result.duration.as_millis() as u64,
                        "faces pipeline completed"
                    );
                    None
                }
            },
        };

        let _ = tx.send(StepOutcome { name: "faces", error }).await;
    });
}

#[allow(clippy::too_many_arguments)]
fn spawn_scenes(
    job_id: Uuid,
    file_id: Uuid,
    executor: Arc<dyn PipelineExecutor>,
    video: PathBuf,
    artifacts_base: PathBuf,
    speech_result: PathBuf,
    ocr_enabled: bool,
    redact_pii: bool,
    cancel: CancellationToken,
    tx: mpsc::Sender<StepOutcome>,
) {
    tokio::spawn(async move {
        let out = artifacts_base.join("scenes").join("result.json");
        tracing::info!(job_id = %job_id, file_id = %file_id, "running scenes pipeline");

        let request = ScenesRequest {
            video,
            video_id: file_id.to_string(),
            speech_result,
            out: out.clone(),
            ocr_enabled,
            redact_pii,
        };

        let error = match executor.run_scenes(request, cancel).await {
            Err(e) => Some(format!("scenes pipeline error: {e}")),
            Ok(result) if !result.is_success() => Some(format!(
                "scenes pipeline exited {}: {}",
                result.exit_code,
                tail_str(&result.stderr_tail, 512)
            )),
            Ok(result) => match executor.validate_scene_output(&out) {
                Err(e) => Some(format!("scenes output invalid: {e}")),
                Ok(_) => {
                    tracing::info!(
                        job_id = %job_id,
                        duration_ms = result.duration.as_millis() as u64,
                        "scenes pipeline completed"
                    );
                    None
                }
            },
        };

        let _ = tx.send(StepOutcome { name: "scenes", error }).await;
    });
}
