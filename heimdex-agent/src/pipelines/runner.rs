//! Pipeline subprocess runner
//!
//! Executes `python -m heimdex_media_pipelines <subcommand>` for each
//! analysis step, enforcing a per-step timeout, honoring cancellation, and
//! keeping a bounded tail of stderr for diagnostics. A nonzero exit is a
//! step failure reported through `RunResult`, not an error.

use crate::pipelines::types::{Capabilities, DoctorReport, PipelineOutput, RunResult, SceneOutput};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

/// Bytes of stderr kept for diagnostics.
const MAX_STDERR_BYTES: usize = 8 * 1024;

/// Pipeline runner errors. These are transport-level failures; subprocess
/// exit codes travel in `RunResult` instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("No python binary found on PATH (tried python3, python)")]
    PythonNotFound,

    #[error("Configured python {0:?} not found")]
    ConfiguredPythonNotFound(String),

    #[error("Failed to spawn pipeline process: {0}")]
    Spawn(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Doctor probe failed: {0}")]
    Doctor(String),

    #[error("Cannot parse pipeline output: {0}")]
    Parse(String),

    #[error("Pipeline output invalid: {0}")]
    Invalid(String),
}

/// Arguments for a scene-pipeline run.
#[derive(Debug, Clone)]
pub struct ScenesRequest {
    pub video: PathBuf,
    pub video_id: String,
    pub speech_result: PathBuf,
    pub out: PathBuf,
    pub ocr_enabled: bool,
    pub redact_pii: bool,
}

/// Execution contract for the analysis pipelines. The orchestrator only
/// sees this trait; tests substitute in-process fakes.
#[async_trait]
pub trait PipelineExecutor: Send + Sync {
    async fn run_doctor(&self, cancel: CancellationToken) -> Result<Capabilities, PipelineError>;

    async fn run_speech(
        &self,
        video: &Path,
        out: &Path,
        cancel: CancellationToken,
    ) -> Result<RunResult, PipelineError>;

    async fn run_faces(
        &self,
        video: &Path,
        out: &Path,
        cancel: CancellationToken,
    ) -> Result<RunResult, PipelineError>;

    async fn run_scenes(
        &self,
        request: ScenesRequest,
        cancel: CancellationToken,
    ) -> Result<RunResult, PipelineError>;

    fn validate_output(&self, path: &Path) -> Result<PipelineOutput, PipelineError> {
        validate_output(path)
    }

    fn validate_scene_output(&self, path: &Path) -> Result<SceneOutput, PipelineError> {
        validate_scene_output(path)
    }

    fn artifacts_dir(&self) -> &Path;
}

/// Runner configuration.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Path to the python binary; `None` auto-detects python3 then python.
    pub python_path: Option<String>,
    pub module_name: String,
    pub artifacts_base: PathBuf,
    pub doctor_timeout: Duration,
    pub speech_timeout: Duration,
    pub faces_timeout: Duration,
    pub scenes_timeout: Duration,
}

impl RunnerConfig {
    pub fn from_agent(cfg: &heimdex_common::config::AgentConfig) -> Self {
        Self {
            python_path: cfg.pipelines_python.clone(),
            module_name: cfg.pipelines_module.clone(),
            artifacts_base: cfg.artifacts_dir(),
            doctor_timeout: cfg.doctor_timeout,
            speech_timeout: cfg.speech_timeout,
            faces_timeout: cfg.faces_timeout,
            scenes_timeout: cfg.scenes_timeout,
        }
    }
}

/// Production implementation spawning the Python CLI.
pub struct SubprocessRunner {
    cfg: RunnerConfig,
    python: String,
}

impl SubprocessRunner {
    pub fn new(cfg: RunnerConfig) -> Result<Self, PipelineError> {
        let python = resolve_python(cfg.python_path.as_deref())?;

        std::fs::create_dir_all(&cfg.artifacts_base)?;

        tracing::info!(
            python = %python,
            module = %cfg.module_name,
            artifacts_dir = %cfg.artifacts_base.display(),
            "pipeline runner initialised"
        );

        Ok(Self { cfg, python })
    }

    /// Core subprocess execution helper.
    async fn exec(
        &self,
        timeout: Duration,
        cancel: &CancellationToken,
        out_path: &Path,
        args: Vec<OsString>,
    ) -> Result<RunResult, PipelineError> {
        let start = Instant::now();

        if let Some(parent) = out_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tracing::info!(
            module = %self.cfg.module_name,
            args = ?args,
            timeout_s = timeout.as_secs(),
            "executing pipeline command"
        );

        let mut child = tokio::process::Command::new(&self.python)
            .arg("-m")
            .arg(&self.cfg.module_name)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PipelineError::Spawn(e.to_string()))?;

        let stderr = child.stderr.take();
        let stderr_task = tokio::spawn(read_stderr_tail(stderr));

        let status = tokio::select! {
            status = child.wait() => status?,
            _ = tokio::time::sleep(timeout) => {
                tracing::warn!(timeout_s = timeout.as_secs(), "pipeline command timed out, killing");
                let _ = child.start_kill();
                child.wait().await?
            }
            _ = cancel.cancelled() => {
                tracing::info!("pipeline command cancelled, killing");
                let _ = child.start_kill();
                child.wait().await?
            }
        };

        let stderr_tail = stderr_task.await.unwrap_or_default();
        let exit_code = status.code().unwrap_or(-1);
        let duration = start.elapsed();

        if exit_code != 0 {
            tracing::warn!(
                exit_code,
                duration_ms = duration.as_millis() as u64,
                stderr_tail = %tail_str(&stderr_tail, 512),
                "pipeline command failed"
            );
        } else {
            tracing::info!(
                duration_ms = duration.as_millis() as u64,
                output = %out_path.display(),
                "pipeline command succeeded"
            );
        }

        Ok(RunResult {
            exit_code,
            output_path: out_path.to_path_buf(),
            stderr_tail,
            duration,
        })
    }
}

#[async_trait]
impl PipelineExecutor for SubprocessRunner {
    /// Probe the installed pipelines environment.
    async fn run_doctor(&self, cancel: CancellationToken) -> Result<Capabilities, PipelineError> {
        let out_path = self.cfg.artifacts_base.join(".doctor.json");

        let args = vec![
            OsString::from("doctor"),
            OsString::from("--json"),
            OsString::from("--out"),
            out_path.as_os_str().to_owned(),
        ];
        let result = self.exec(self.cfg.doctor_timeout, &cancel, &out_path, args).await?;
        if !result.is_success() {
            return Err(PipelineError::Doctor(format!(
                "doctor exited {}: {}",
                result.exit_code, result.stderr_tail
            )));
        }

        let data = tokio::fs::read(&out_path).await?;
        let report: DoctorReport =
            serde_json::from_slice(&data).map_err(|e| PipelineError::Parse(e.to_string()))?;

        let caps = Capabilities::derive(report);
        tracing::info!(
            speech = caps.has_speech,
            faces = caps.has_faces,
            scenes = caps.has_scenes,
            ocr = caps.has_ocr,
            deps_available = caps.report.summary.available,
            deps_total = caps.report.summary.total,
            "doctor probe complete"
        );

        Ok(caps)
    }

    async fn run_speech(
        &self,
        video: &Path,
        out: &Path,
        cancel: CancellationToken,
    ) -> Result<RunResult, PipelineError> {
        let args = vec![
            OsString::from("speech"),
            OsString::from("pipeline"),
            OsString::from("--video"),
            video.as_os_str().to_owned(),
            OsString::from("--out"),
            out.as_os_str().to_owned(),
        ];
        self.exec(self.cfg.speech_timeout, &cancel, out, args).await
    }

    async fn run_faces(
        &self,
        video: &Path,
        out: &Path,
        cancel: CancellationToken,
    ) -> Result<RunResult, PipelineError> {
        let args = vec![
            OsString::from("faces"),
            OsString::from("detect"),
            OsString::from("--video"),
            video.as_os_str().to_owned(),
            OsString::from("--fps"),
            OsString::from("1.0"),
            OsString::from("--out"),
            out.as_os_str().to_owned(),
        ];
        self.exec(self.cfg.faces_timeout, &cancel, out, args).await
    }

    async fn run_scenes(
        &self,
        request: ScenesRequest,
        cancel: CancellationToken,
    ) -> Result<RunResult, PipelineError> {
        let mut args = vec![
            OsString::from("scenes"),
            OsString::from("pipeline"),
            OsString::from("--video"),
            request.video.as_os_str().to_owned(),
            OsString::from("--video-id"),
            OsString::from(&request.video_id),
            OsString::from("--speech-result"),
            request.speech_result.as_os_str().to_owned(),
            OsString::from("--out"),
            request.out.as_os_str().to_owned(),
        ];
        if request.ocr_enabled {
            args.push(OsString::from("--ocr"));
            if request.redact_pii {
                args.push(OsString::from("--redact-pii"));
            }
        }
        self.exec(self.cfg.scenes_timeout, &cancel, &request.out, args).await
    }

    fn artifacts_dir(&self) -> &Path {
        &self.cfg.artifacts_base
    }
}

/// Read a pipeline JSON artifact and check the required metadata fields.
pub fn validate_output(path: &Path) -> Result<PipelineOutput, PipelineError> {
    let data = std::fs::read(path)
        .map_err(|e| PipelineError::Parse(format!("cannot read output file {}: {e}", path.display())))?;

    let output: PipelineOutput =
        serde_json::from_slice(&data).map_err(|e| PipelineError::Parse(e.to_string()))?;

    let missing = output.missing_fields();
    if !missing.is_empty() {
        return Err(PipelineError::Invalid(format!(
            "missing required fields: {}",
            missing.join(", ")
        )));
    }

    Ok(output)
}

/// Read a scene artifact and check metadata plus the per-scene invariants:
/// non-negative, non-empty intervals, well-formed scene ids, and strict
/// non-overlapping ordering (each scene starts at or after the previous
/// scene's end).
pub fn validate_scene_output(path: &Path) -> Result<SceneOutput, PipelineError> {
    let data = std::fs::read(path)
        .map_err(|e| PipelineError::Parse(format!("cannot read output file {}: {e}", path.display())))?;

    let output: SceneOutput =
        serde_json::from_slice(&data).map_err(|e| PipelineError::Parse(e.to_string()))?;

    let missing = output.meta.missing_fields();
    if !missing.is_empty() {
        return Err(PipelineError::Invalid(format!(
            "missing required fields: {}",
            missing.join(", ")
        )));
    }

    if output.video_id.is_empty() {
        return Err(PipelineError::Invalid("missing required fields: video_id".to_string()));
    }

    let mut prev_end = 0i64;
    for (i, scene) in output.scenes.iter().enumerate() {
        if scene.start_ms < 0 {
            return Err(PipelineError::Invalid(format!(
                "scene {i}: start_ms {} is negative",
                scene.start_ms
            )));
        }
        if scene.end_ms <= scene.start_ms {
            return Err(PipelineError::Invalid(format!(
                "scene {i}: end_ms {} not after start_ms {}",
                scene.end_ms, scene.start_ms
            )));
        }
        if !is_valid_scene_id(&scene.scene_id) {
            return Err(PipelineError::Invalid(format!(
                "scene {i}: malformed scene_id {:?}",
                scene.scene_id
            )));
        }
        if i > 0 && scene.start_ms < prev_end {
            return Err(PipelineError::Invalid(format!(
                "scene {i}: start_ms {} overlaps previous scene ending at {}",
                scene.start_ms, prev_end
            )));
        }
        prev_end = scene.end_ms;
    }

    Ok(output)
}

/// Scene ids look like `<prefix>_scene_<digits>` with a non-empty prefix.
fn is_valid_scene_id(id: &str) -> bool {
    match id.rfind("_scene_") {
        Some(pos) if pos > 0 => {
            let digits = &id[pos + "_scene_".len()..];
            !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
        }
        _ => false,
    }
}

/// Last `max` bytes of a string, respecting UTF-8 boundaries.
pub(crate) fn tail_str(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut idx = s.len() - max;
    while !s.is_char_boundary(idx) {
        idx += 1;
    }
    &s[idx..]
}

/// Drain stderr keeping only the last `MAX_STDERR_BYTES` bytes.
async fn read_stderr_tail(stderr: Option<tokio::process::ChildStderr>) -> String {
    let mut tail: Vec<u8> = Vec::new();
    if let Some(mut stderr) = stderr {
        let mut chunk = [0u8; 4096];
        loop {
            match stderr.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    tail.extend_from_slice(&chunk[..n]);
                    if tail.len() > MAX_STDERR_BYTES {
                        let excess = tail.len() - MAX_STDERR_BYTES;
                        tail.drain(..excess);
                    }
                }
            }
        }
    }
    String::from_utf8_lossy(&tail).into_owned()
}

/// Find a usable python binary.
fn resolve_python(preferred: Option<&str>) -> Result<String, PipelineError> {
    if let Some(preferred) = preferred {
        if python_works(preferred) {
            return Ok(preferred.to_string());
        }
        return Err(PipelineError::ConfiguredPythonNotFound(preferred.to_string()));
    }

    for name in ["python3", "python"] {
        if python_works(name) {
            return Ok(name.to_string());
        }
    }

    Err(PipelineError::PythonNotFound)
}

fn python_works(binary: &str) -> bool {
    std::process::Command::new(binary)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}
