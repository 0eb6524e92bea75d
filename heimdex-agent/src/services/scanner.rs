//! Video file discovery and fingerprinting
//!
//! Walks a scan root recursively, pruning any directory whose name begins
//! with a dot, and catalogs regular files with a recognized video
//! extension. The fingerprint is the SHA-256 of the first 64 KiB of
//! content, so equal inputs hash identically across hosts.

use crate::models::is_video_file;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

/// Bytes hashed into the fingerprint.
pub const FINGERPRINT_BYTES: u64 = 64 * 1024;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("File access error {0}: {1}")]
    FileAccess(PathBuf, String),
}

/// Walk `root` and return every catalogable video file.
///
/// Per-entry access errors are logged and skipped; only a missing or
/// non-directory root fails the walk.
pub fn discover_videos(root: &Path) -> Result<Vec<PathBuf>, ScanError> {
    if !root.exists() {
        return Err(ScanError::PathNotFound(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(ScanError::NotADirectory(root.to_path_buf()));
    }

    let mut videos = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !is_hidden_dir(e));

    for entry in walker {
        match entry {
            Ok(entry) => {
                if entry.file_type().is_file()
                    && is_video_file(&entry.file_name().to_string_lossy())
                {
                    videos.push(entry.path().to_path_buf());
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "error accessing entry during scan");
            }
        }
    }

    Ok(videos)
}

fn is_hidden_dir(entry: &DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_string_lossy()
            .starts_with('.')
}

/// SHA-256 over the first `min(file size, 64 KiB)` bytes, hex encoded.
pub fn compute_fingerprint(path: &Path) -> Result<String, ScanError> {
    let file = std::fs::File::open(path)
        .map_err(|e| ScanError::FileAccess(path.to_path_buf(), e.to_string()))?;

    let mut hasher = Sha256::new();
    let mut reader = file.take(FINGERPRINT_BYTES);
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader
            .read(&mut chunk)
            .map_err(|e| ScanError::FileAccess(path.to_path_buf(), e.to_string()))?;
        if n == 0 {
            break;
        }
        hasher.update(&chunk[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}
