//! FFmpeg keyframe extraction
//!
//! Thin client around the external `ffmpeg` binary, used by the thumbnail
//! job to pull one JPEG per scene at its keyframe timestamp.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;

const THUMBNAIL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum FfmpegError {
    #[error("ffmpeg binary not found in PATH")]
    BinaryNotFound,

    #[error("Failed to execute ffmpeg: {0}")]
    Execution(String),

    #[error("ffmpeg exited {0}: {1}")]
    Failed(i32, String),

    #[error("ffmpeg timed out after {0:?}")]
    Timeout(Duration),
}

/// Keyframe extraction contract; the orchestrator only sees this trait.
#[async_trait]
pub trait Thumbnailer: Send + Sync {
    /// Extract a single JPEG frame at `offset_secs` into `out`.
    async fn extract_keyframe(
        &self,
        video: &Path,
        out: &Path,
        offset_secs: f64,
    ) -> Result<(), FfmpegError>;
}

pub struct FfmpegThumbnailer {
    binary: String,
}

impl FfmpegThumbnailer {
    /// Create the thumbnailer, verifying the binary is runnable.
    pub fn new() -> Result<Self, FfmpegError> {
        let binary = "ffmpeg";
        match std::process::Command::new(binary)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
        {
            Ok(_) => Ok(Self {
                binary: binary.to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(FfmpegError::BinaryNotFound),
            Err(e) => Err(FfmpegError::Execution(e.to_string())),
        }
    }

    pub fn is_available() -> bool {
        Self::new().is_ok()
    }
}

#[async_trait]
impl Thumbnailer for FfmpegThumbnailer {
    async fn extract_keyframe(
        &self,
        video: &Path,
        out: &Path,
        offset_secs: f64,
    ) -> Result<(), FfmpegError> {
        let output = tokio::process::Command::new(&self.binary)
            .arg("-y")
            .arg("-ss")
            .arg(format!("{offset_secs:.3}"))
            .arg("-i")
            .arg(video)
            .arg("-frames:v")
            .arg("1")
            .arg("-q:v")
            .arg("2")
            .arg(out)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(THUMBNAIL_TIMEOUT, output)
            .await
            .map_err(|_| FfmpegError::Timeout(THUMBNAIL_TIMEOUT))?
            .map_err(|e| FfmpegError::Execution(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail = crate::pipelines::runner::tail_str(&stderr, 512).to_string();
            return Err(FfmpegError::Failed(output.status.code().unwrap_or(-1), tail));
        }

        Ok(())
    }
}
