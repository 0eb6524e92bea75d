//! Edit decision list (EDL) export
//!
//! Generates CMX 3600-style EDL text from resolved clips so the companion
//! UI can hand selections to an NLE. Timecodes are `HH:MM:SS:FF` at the
//! requested frame rate, with the drop-frame flag set for 29.97/59.94.

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Deserialize)]
pub struct ExportRequest {
    #[serde(default)]
    pub project_name: String,
    pub format: String,
    #[serde(default)]
    pub frame_rate: f64,
    pub output_dir: String,
    pub clips: Vec<ClipInput>,
}

#[derive(Debug, Deserialize)]
pub struct ClipInput {
    pub video_id: String,
    #[serde(default)]
    pub scene_id: String,
    #[serde(default)]
    pub clip_name: String,
    pub start_ms: i64,
    pub end_ms: i64,
}

/// A clip whose media path has been resolved against the catalog.
#[derive(Debug, Clone)]
pub struct ResolvedClip {
    pub clip_name: String,
    pub media_path: String,
    pub start_ms: i64,
    pub end_ms: i64,
}

#[derive(Debug, Serialize)]
pub struct ExportResponse {
    pub status: String,
    pub format: String,
    pub output_path: String,
    pub clip_count: usize,
    pub unresolved_clips: Vec<String>,
}

/// Render clips as an EDL. Record timecodes run sequentially from zero.
pub fn generate_edl(clips: &[ResolvedClip], title: &str, frame_rate: f64) -> String {
    let fps = frame_rate.round() as i64;
    let fps = if fps <= 0 { 30 } else { fps };

    let is_drop_frame = (frame_rate - 29.97).abs() < 0.01 || (frame_rate - 59.94).abs() < 0.01;

    let mut lines = vec![format!("TITLE: {title}")];
    lines.push(if is_drop_frame {
        "FCM: DROP FRAME".to_string()
    } else {
        "FCM: NON-DROP FRAME".to_string()
    });
    lines.push(String::new());

    let mut record_offset_ms = 0i64;
    for (i, clip) in clips.iter().enumerate() {
        let src_in = ms_to_timecode(clip.start_ms, fps);
        let src_out = ms_to_timecode(clip.end_ms, fps);
        let rec_in = ms_to_timecode(record_offset_ms, fps);
        let duration_ms = clip.end_ms - clip.start_ms;
        let rec_out = ms_to_timecode(record_offset_ms + duration_ms, fps);

        lines.push(format!(
            "{:03}  {:<8} {:<5} C        {} {} {} {}",
            i + 1,
            "AX",
            "V",
            src_in,
            src_out,
            rec_in,
            rec_out
        ));
        lines.push(format!("* FROM CLIP NAME:  {}", clip.clip_name));
        lines.push(format!("* MEDIA PATH:  {}", clip.media_path));

        record_offset_ms += duration_ms;
    }

    lines.push(String::new());
    lines.join("\n")
}

fn ms_to_timecode(ms: i64, fps: i64) -> String {
    let total_frames = (ms as f64 * fps as f64 / 1000.0).round() as i64;
    let frames = total_frames % fps;
    let total_seconds = total_frames / fps;
    let seconds = total_seconds % 60;
    let total_minutes = total_seconds / 60;
    let minutes = total_minutes % 60;
    let hours = total_minutes / 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}:{frames:02}")
}

/// Strip control characters, replace anything outside a conservative
/// allowlist with `_`, and bound the length.
pub fn sanitize_name(s: &str, max_len: usize) -> String {
    let cleaned: String = s
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, ' ' | '-' | '_' | '.' | ',' | '(' | ')') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let cleaned = cleaned.trim();
    if max_len > 0 {
        cleaned.chars().take(max_len).collect()
    } else {
        cleaned.to_string()
    }
}

/// Reject traversal and non-directories before writing an export there.
pub fn validate_output_dir(dir: &str) -> Result<(), String> {
    if dir.trim().is_empty() {
        return Err("output_dir is required".to_string());
    }

    if dir.split('/').any(|part| part == "..") {
        return Err("output_dir cannot contain path traversal".to_string());
    }

    let path = Path::new(dir);
    match std::fs::metadata(path) {
        Ok(info) if info.is_dir() => Ok(()),
        Ok(_) => Err("output_dir is not a directory".to_string()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err("output_dir does not exist".to_string())
        }
        Err(e) => Err(format!("invalid output_dir: {e}")),
    }
}
