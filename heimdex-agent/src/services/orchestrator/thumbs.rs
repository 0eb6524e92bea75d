//! Thumbnail generation job
//!
//! Extracts one JPEG keyframe per scene from the scene artifact. Existing
//! thumbnails are skipped and individual extraction failures do not fail
//! the job.

use super::JobOrchestrator;
use crate::db;
use crate::models::{Job, JobStatus};
use crate::pipelines::types::SceneOutput;

pub(crate) async fn process_thumbnail_job(o: &JobOrchestrator, job: &Job) {
    let (Some(executor), Some(thumbnailer)) = (o.executor.clone(), o.thumbnailer.clone()) else {
        o.mark_failed(job.id, "thumbnail generation not configured").await;
        return;
    };

    o.mark_status(job.id, JobStatus::Running, None).await;

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

    let artifacts_base = executor.artifacts_dir().join(file_id.to_string());
    let scene_path = artifacts_base.join("scenes").join("result.json");

    let data = match tokio::fs::read(&scene_path).await {
        Ok(data) => data,
        Err(e) => {
            o.mark_failed(job.id, &format!("cannot read scene result: {e}")).await;
            return;
        }
    };
    let output: SceneOutput = match serde_json::from_slice(&data) {
        Ok(output) => output,
        Err(_) => {
            o.mark_failed(job.id, "invalid scene JSON").await;
            return;
        }
    };

    let thumb_dir = artifacts_base.join("thumbnails");
    if let Err(e) = tokio::fs::create_dir_all(&thumb_dir).await {
        o.mark_failed(job.id, &format!("cannot create thumbnail dir: {e}")).await;
        return;
    }

    let video_path = std::path::PathBuf::from(&file.path);
    let mut generated = 0;
    for scene in &output.scenes {
        let out_path = thumb_dir.join(format!("{}.jpg", scene.scene_id));
        if out_path.exists() {
            generated += 1;
            continue;
        }

        let offset_secs = scene.keyframe_timestamp_ms as f64 / 1000.0;
        match thumbnailer.extract_keyframe(&video_path, &out_path, offset_secs).await {
            Ok(()) => generated += 1,
            Err(e) => {
                tracing::warn!(scene_id = %scene.scene_id, error = %e, "thumbnail generation failed");
            }
        }
    }

    tracing::info!(
        file_id = %file_id,
        count = generated,
        total = output.scenes.len(),
        "thumbnails generated"
    );
    o.mark_status(job.id, JobStatus::Completed, None).await;
}
