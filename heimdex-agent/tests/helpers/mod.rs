//! Shared fixtures for integration tests: a file-backed scratch database,
//! in-process pipeline/cloud/thumbnail fakes, and row seeding.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use heimdex_agent::cloud::{
    CloudIngest, LibraryInfo, SceneIngestPayload, SceneIngestResponse, UploadError,
};
use heimdex_agent::models::{Job, JobStatus, JobType, Source, SourceKind, VideoFile};
use heimdex_agent::pipelines::runner::{PipelineError, PipelineExecutor, ScenesRequest};
use heimdex_agent::pipelines::types::{
    Capabilities, DoctorReport, PipelinesInfo, RunResult, SceneBoundary, SceneOutput,
};
use heimdex_agent::services::{FfmpegError, Thumbnailer};
use sqlx::SqlitePool;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// File-backed scratch database; the TempDir must outlive the pool.
pub async fn scratch_db(dir: &tempfile::TempDir) -> SqlitePool {
    heimdex_common::db::init_database(&dir.path().join("heimdex.db"))
        .await
        .expect("scratch database")
}

pub async fn seed_source(pool: &SqlitePool, kind: SourceKind) -> Source {
    let source = Source {
        id: Uuid::new_v4(),
        kind,
        path: format!("/videos/{}", Uuid::new_v4()),
        display_name: "Videos".to_string(),
        drive_nickname: None,
        cloud_library_id: None,
        present: true,
        created_at: Utc::now(),
    };
    heimdex_agent::db::sources::create_source(pool, &source)
        .await
        .unwrap();
    source
}

pub async fn seed_file(pool: &SqlitePool, source_id: Uuid, filename: &str) -> VideoFile {
    let file = VideoFile {
        id: Uuid::new_v4(),
        source_id,
        path: format!("/videos/{filename}"),
        filename: filename.to_string(),
        size: 1024,
        mtime: Utc::now(),
        fingerprint: "deadbeef".to_string(),
        created_at: Utc::now(),
    };
    heimdex_agent::db::files::upsert_file(pool, &file)
        .await
        .unwrap();
    file
}

pub async fn seed_job(pool: &SqlitePool, job: &Job) {
    heimdex_agent::db::jobs::create_job(pool, job).await.unwrap();
}

pub async fn pending_index_job(pool: &SqlitePool, file: &VideoFile) -> Job {
    let job = Job {
        source_id: Some(file.source_id),
        file_id: Some(file.id),
        ..Job::pending(JobType::Index)
    };
    seed_job(pool, &job).await;
    job
}

pub async fn load_job(pool: &SqlitePool, id: Uuid) -> Job {
    heimdex_agent::db::jobs::get_job(pool, id)
        .await
        .unwrap()
        .expect("job row")
}

pub async fn jobs_of_type(pool: &SqlitePool, job_type: JobType) -> Vec<Job> {
    heimdex_agent::db::jobs::list_jobs(pool, 1000)
        .await
        .unwrap()
        .into_iter()
        .filter(|j| j.job_type == job_type)
        .collect()
}

/// Rewrite a job's updated_at so backoff windows can be fast-forwarded.
pub async fn age_job(pool: &SqlitePool, id: Uuid, seconds_ago: i64) {
    let past = (Utc::now() - chrono::Duration::seconds(seconds_ago)).to_rfc3339();
    sqlx::query("UPDATE jobs SET updated_at = ? WHERE id = ?")
        .bind(past)
        .bind(id.to_string())
        .execute(pool)
        .await
        .unwrap();
}

/// How a fake pipeline step behaves when invoked.
#[derive(Debug, Clone, Copy)]
pub enum StepMode {
    /// Write a valid artifact and exit 0.
    Succeed,
    /// Exit nonzero with fixed stderr.
    ExitNonzero(i32),
    /// Fail at the transport level (spawn error).
    TransportError,
    /// Block until cancelled, then report a killed subprocess.
    WaitForCancel,
}

pub struct MockExecutor {
    pub artifacts: PathBuf,
    pub pipelines: PipelinesInfo,
    pub speech: StepMode,
    pub faces: StepMode,
    pub scenes: StepMode,
    /// Scenes written into a successful scene artifact.
    pub scene_count: usize,
    pub calls: Mutex<Vec<&'static str>>,
    pub scenes_exited: AtomicBool,
    pub faces_exited: AtomicBool,
}

impl MockExecutor {
    pub fn new(artifacts: &Path) -> Self {
        Self {
            artifacts: artifacts.to_path_buf(),
            pipelines: PipelinesInfo {
                speech: true,
                faces: true,
                scenes: true,
                ocr: false,
            },
            speech: StepMode::Succeed,
            faces: StepMode::Succeed,
            scenes: StepMode::Succeed,
            scene_count: 2,
            calls: Mutex::new(Vec::new()),
            scenes_exited: AtomicBool::new(false),
            faces_exited: AtomicBool::new(false),
        }
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, step: &'static str) {
        self.calls.lock().unwrap().push(step);
    }

    async fn run_step(
        &self,
        mode: StepMode,
        out: &Path,
        artifact: String,
        cancel: CancellationToken,
    ) -> Result<RunResult, PipelineError> {
        match mode {
            StepMode::Succeed => {
                write_json(out, &artifact);
                Ok(run_result(0, out, ""))
            }
            StepMode::ExitNonzero(code) => Ok(run_result(code, out, "step blew up\n")),
            StepMode::TransportError => Err(PipelineError::Spawn("mock spawn failure".into())),
            StepMode::WaitForCancel => {
                tokio::select! {
                    _ = cancel.cancelled() => Ok(run_result(-1, out, "killed\n")),
                    _ = tokio::time::sleep(Duration::from_secs(30)) => {
                        write_json(out, &artifact);
                        Ok(run_result(0, out, ""))
                    }
                }
            }
        }
    }
}

#[async_trait]
impl PipelineExecutor for MockExecutor {
    async fn run_doctor(&self, _cancel: CancellationToken) -> Result<Capabilities, PipelineError> {
        self.record("doctor");
        let report = DoctorReport {
            pipelines: Some(self.pipelines),
            ..DoctorReport::default()
        };
        Ok(Capabilities::derive(report))
    }

    async fn run_speech(
        &self,
        _video: &Path,
        out: &Path,
        cancel: CancellationToken,
    ) -> Result<RunResult, PipelineError> {
        self.record("speech");
        self.run_step(self.speech, out, meta_artifact(), cancel).await
    }

    async fn run_faces(
        &self,
        _video: &Path,
        out: &Path,
        cancel: CancellationToken,
    ) -> Result<RunResult, PipelineError> {
        self.record("faces");
        let result = self.run_step(self.faces, out, meta_artifact(), cancel).await;
        self.faces_exited.store(true, Ordering::SeqCst);
        result
    }

    async fn run_scenes(
        &self,
        request: ScenesRequest,
        cancel: CancellationToken,
    ) -> Result<RunResult, PipelineError> {
        self.record("scenes");
        let artifact = scene_artifact(&request.video_id, self.scene_count);
        let result = self.run_step(self.scenes, &request.out, artifact, cancel).await;
        self.scenes_exited.store(true, Ordering::SeqCst);
        result
    }

    fn artifacts_dir(&self) -> &Path {
        &self.artifacts
    }
}

fn run_result(exit_code: i32, out: &Path, stderr: &str) -> RunResult {
    RunResult {
        exit_code,
        output_path: out.to_path_buf(),
        stderr_tail: stderr.to_string(),
        duration: Duration::from_millis(5),
    }
}

pub fn write_json(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

pub fn meta_artifact() -> String {
    r#"{"schema_version":"1.0","pipeline_version":"0.4.0","model_version":"base"}"#.to_string()
}

pub fn scene_artifact(video_id: &str, scene_count: usize) -> String {
    let scenes: Vec<SceneBoundary> = (0..scene_count)
        .map(|i| SceneBoundary {
            scene_id: format!("{video_id}_scene_{i}"),
            index: i as i64,
            start_ms: (i as i64) * 1000,
            end_ms: (i as i64 + 1) * 1000,
            keyframe_timestamp_ms: (i as i64) * 1000 + 500,
            transcript_raw: format!("scene {i} transcript"),
            speech_segment_count: 1,
            ..SceneBoundary::default()
        })
        .collect();

    let output = SceneOutput {
        meta: serde_json::from_str(&meta_artifact()).unwrap(),
        video_id: video_id.to_string(),
        total_duration_ms: (scene_count as i64) * 1000,
        scenes,
    };
    serde_json::to_string(&output).unwrap()
}

/// Write a valid on-disk scene artifact for a file id.
pub fn write_scene_artifact(artifacts: &Path, file_id: Uuid, scene_count: usize) {
    let path = artifacts
        .join(file_id.to_string())
        .join("scenes")
        .join("result.json");
    write_json(&path, &scene_artifact(&file_id.to_string(), scene_count));
}

pub struct MockCloud {
    pub uploads: Mutex<Vec<SceneIngestPayload>>,
    /// Scripted per-call outcomes; exhausted queue means success.
    pub outcomes: Mutex<VecDeque<Result<(), UploadError>>>,
    pub library_calls: Mutex<Vec<String>>,
}

impl MockCloud {
    pub fn new() -> Self {
        Self {
            uploads: Mutex::new(Vec::new()),
            outcomes: Mutex::new(VecDeque::new()),
            library_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn script(&self, outcome: Result<(), UploadError>) {
        self.outcomes.lock().unwrap().push_back(outcome);
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }
}

#[async_trait]
impl CloudIngest for MockCloud {
    async fn upload_scenes(
        &self,
        payload: &SceneIngestPayload,
    ) -> Result<SceneIngestResponse, UploadError> {
        self.uploads.lock().unwrap().push(payload.clone());
        match self.outcomes.lock().unwrap().pop_front() {
            Some(Err(e)) => Err(e),
            _ => Ok(SceneIngestResponse {
                indexed_count: payload.scenes.len() as i64,
                video_id: payload.video_id.clone(),
                skipped_count: 0,
            }),
        }
    }

    async fn get_or_create_library(&self, name: &str) -> Result<LibraryInfo, UploadError> {
        self.library_calls.lock().unwrap().push(name.to_string());
        Ok(LibraryInfo {
            id: "lib-mock".to_string(),
            name: name.to_string(),
            created: true,
        })
    }
}

pub struct MockThumbnailer {
    pub calls: Mutex<Vec<PathBuf>>,
    pub fail: bool,
}

impl MockThumbnailer {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail: false,
        }
    }
}

#[async_trait]
impl Thumbnailer for MockThumbnailer {
    async fn extract_keyframe(
        &self,
        _video: &Path,
        out: &Path,
        _offset_secs: f64,
    ) -> Result<(), FfmpegError> {
        self.calls.lock().unwrap().push(out.to_path_buf());
        if self.fail {
            return Err(FfmpegError::Failed(1, "mock failure".into()));
        }
        write_json(out, "jpeg");
        Ok(())
    }
}

pub fn assert_status(job: &Job, status: JobStatus) {
    assert_eq!(
        job.status, status,
        "job {} expected {:?}, got {:?} (error: {:?})",
        job.id, status, job.status, job.error
    );
}
