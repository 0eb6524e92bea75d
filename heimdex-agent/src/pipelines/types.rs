//! Pipeline result and capability types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Raw doctor JSON as emitted by `doctor --json`.
///
/// Every field defaults so older pipeline builds that omit sections still
/// parse; capability derivation handles the gaps.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DoctorReport {
    #[serde(default)]
    pub package_version: String,
    #[serde(default)]
    pub python: PythonInfo,
    #[serde(default)]
    pub dependencies: HashMap<String, DepInfo>,
    #[serde(default)]
    pub executables: HashMap<String, DepInfo>,
    #[serde(default)]
    pub gpu: GpuInfo,
    #[serde(default)]
    pub summary: SummaryInfo,
    /// Structured per-pipeline availability; present in newer doctor
    /// outputs and preferred over dependency-based derivation.
    #[serde(default)]
    pub pipelines: Option<PipelinesInfo>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PythonInfo {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub executable: String,
}

/// Availability status of a single dependency or executable.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DepInfo {
    #[serde(default)]
    pub available: bool,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GpuInfo {
    #[serde(default)]
    pub cuda_available: bool,
    #[serde(default)]
    pub device_count: Option<i64>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SummaryInfo {
    #[serde(default)]
    pub available: i64,
    #[serde(default)]
    pub total: i64,
    #[serde(default)]
    pub all_ok: bool,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
pub struct PipelinesInfo {
    #[serde(default)]
    pub speech: bool,
    #[serde(default)]
    pub faces: bool,
    #[serde(default)]
    pub scenes: bool,
    #[serde(default)]
    pub ocr: bool,
}

/// Derived capability snapshot consulted by the orchestrator and the
/// status endpoint.
#[derive(Debug, Clone)]
pub struct Capabilities {
    pub has_speech: bool,
    pub has_faces: bool,
    pub has_scenes: bool,
    pub has_ocr: bool,
    pub probed_at: DateTime<Utc>,
    pub report: DoctorReport,
}

impl Capabilities {
    /// Derive capability flags from a doctor report. The structured
    /// `pipelines` block wins when present; otherwise the legacy
    /// dependency-based rules apply.
    pub fn derive(report: DoctorReport) -> Self {
        let (has_speech, has_faces, has_scenes, has_ocr) = match report.pipelines {
            Some(p) => (p.speech, p.faces, p.scenes, p.ocr),
            None => {
                let dep = |name: &str| {
                    report
                        .dependencies
                        .get(name)
                        .map(|d| d.available)
                        .unwrap_or(false)
                };
                let exe = |name: &str| {
                    report
                        .executables
                        .get(name)
                        .map(|d| d.available)
                        .unwrap_or(false)
                };
                (
                    dep("whisper") && exe("ffmpeg"),
                    dep("cv2") && dep("insightface"),
                    exe("ffmpeg"),
                    false,
                )
            }
        };

        Self {
            has_speech,
            has_faces,
            has_scenes,
            has_ocr,
            probed_at: Utc::now(),
            report,
        }
    }

    pub fn any_available(&self) -> bool {
        self.has_speech || self.has_faces || self.has_scenes
    }
}

/// Structured outcome of executing one pipeline subprocess.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub exit_code: i32,
    /// Path of the `--out` JSON artifact.
    pub output_path: PathBuf,
    /// Last 8 KiB of stderr.
    pub stderr_tail: String,
    pub duration: Duration,
}

impl RunResult {
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Required metadata fields validated in every pipeline output file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PipelineOutput {
    #[serde(default)]
    pub schema_version: String,
    #[serde(default)]
    pub pipeline_version: String,
    #[serde(default)]
    pub model_version: String,
}

impl PipelineOutput {
    /// Names of required fields that are empty or missing.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.schema_version.is_empty() {
            missing.push("schema_version");
        }
        if self.pipeline_version.is_empty() {
            missing.push("pipeline_version");
        }
        if self.model_version.is_empty() {
            missing.push("model_version");
        }
        missing
    }
}

/// Full scene-pipeline artifact.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SceneOutput {
    #[serde(flatten)]
    pub meta: PipelineOutput,
    #[serde(default)]
    pub video_id: String,
    #[serde(default)]
    pub total_duration_ms: i64,
    #[serde(default)]
    pub scenes: Vec<SceneBoundary>,
}

/// One detected scene. Fields missing from older pipeline outputs default
/// safely to empty / zero.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SceneBoundary {
    #[serde(default)]
    pub scene_id: String,
    #[serde(default)]
    pub index: i64,
    #[serde(default)]
    pub start_ms: i64,
    #[serde(default)]
    pub end_ms: i64,
    #[serde(default)]
    pub keyframe_timestamp_ms: i64,
    #[serde(default)]
    pub transcript_raw: String,
    #[serde(default)]
    pub speech_segment_count: i64,
    #[serde(default)]
    pub people_cluster_ids: Vec<String>,
    #[serde(default)]
    pub keyword_tags: Vec<String>,
    #[serde(default)]
    pub product_tags: Vec<String>,
    #[serde(default)]
    pub product_entities: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ocr_text_raw: String,
    #[serde(default)]
    pub ocr_char_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dep(available: bool) -> DepInfo {
        DepInfo {
            available,
            ..DepInfo::default()
        }
    }

    #[test]
    fn structured_pipelines_block_wins() {
        let mut report = DoctorReport::default();
        // Dependencies say nothing is available; the pipelines block
        // overrides them entirely.
        report.pipelines = Some(PipelinesInfo {
            speech: true,
            faces: false,
            scenes: true,
            ocr: true,
        });

        let caps = Capabilities::derive(report);
        assert!(caps.has_speech);
        assert!(!caps.has_faces);
        assert!(caps.has_scenes);
        assert!(caps.has_ocr);
    }

    #[test]
    fn legacy_derivation_from_dependencies() {
        let mut report = DoctorReport::default();
        report.dependencies.insert("whisper".into(), dep(true));
        report.dependencies.insert("cv2".into(), dep(true));
        report.dependencies.insert("insightface".into(), dep(false));
        report.executables.insert("ffmpeg".into(), dep(true));

        let caps = Capabilities::derive(report);
        assert!(caps.has_speech);
        assert!(!caps.has_faces, "faces needs cv2 and insightface");
        assert!(caps.has_scenes);
        assert!(!caps.has_ocr);
    }

    #[test]
    fn legacy_derivation_without_ffmpeg() {
        let mut report = DoctorReport::default();
        report.dependencies.insert("whisper".into(), dep(true));

        let caps = Capabilities::derive(report);
        assert!(!caps.has_speech);
        assert!(!caps.has_scenes);
        assert!(!caps.any_available());
    }

    #[test]
    fn scene_output_parses_with_missing_optional_fields() {
        let json = r#"{
            "schema_version": "1.0",
            "pipeline_version": "0.4.0",
            "model_version": "large-v3",
            "video_id": "vid-1",
            "scenes": [{"scene_id": "vid-1_scene_0", "start_ms": 0, "end_ms": 1500}]
        }"#;

        let output: SceneOutput = serde_json::from_str(json).unwrap();
        assert_eq!(output.meta.schema_version, "1.0");
        assert_eq!(output.scenes.len(), 1);
        assert_eq!(output.total_duration_ms, 0);
        assert!(output.scenes[0].people_cluster_ids.is_empty());
    }
}
