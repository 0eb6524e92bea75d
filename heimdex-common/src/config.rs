//! Agent configuration from environment variables
//!
//! Every knob has a compiled default so a bare `heimdex-agent` invocation
//! works out of the box. Invalid values are startup-fatal rather than
//! silently corrected.

use crate::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8787;
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_DATA_DIR_NAME: &str = ".heimdex";
pub const DB_FILENAME: &str = "heimdex.db";

pub const DEFAULT_PIPELINES_MODULE: &str = "heimdex_media_pipelines";
pub const DEFAULT_DOCTOR_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_SPEECH_TIMEOUT_SECS: u64 = 1800;
pub const DEFAULT_FACES_TIMEOUT_SECS: u64 = 900;
pub const DEFAULT_SCENES_TIMEOUT_SECS: u64 = 600;

pub const ENV_PORT: &str = "HEIMDEX_PORT";
pub const ENV_LOG_LEVEL: &str = "HEIMDEX_LOG_LEVEL";
pub const ENV_DATA_DIR: &str = "HEIMDEX_DATA_DIR";
pub const ENV_PIPELINES_PYTHON: &str = "HEIMDEX_PIPELINES_PYTHON";
pub const ENV_PIPELINES_MODULE: &str = "HEIMDEX_PIPELINES_MODULE";
pub const ENV_TIMEOUT_DOCTOR: &str = "HEIMDEX_PIPELINES_TIMEOUT_DOCTOR";
pub const ENV_TIMEOUT_SPEECH: &str = "HEIMDEX_PIPELINES_TIMEOUT_SPEECH";
pub const ENV_TIMEOUT_FACES: &str = "HEIMDEX_PIPELINES_TIMEOUT_FACES";
pub const ENV_TIMEOUT_SCENES: &str = "HEIMDEX_PIPELINES_TIMEOUT_SCENES";
pub const ENV_OCR_ENABLED: &str = "HEIMDEX_OCR_ENABLED";
pub const ENV_OCR_REDACT_PII: &str = "HEIMDEX_OCR_REDACT_PII";
pub const ENV_FACES_PARALLEL: &str = "HEIMDEX_FACES_PARALLEL_WITH_SPEECH";
pub const ENV_CLOUD_BASE_URL: &str = "HEIMDEX_CLOUD_BASE_URL";
pub const ENV_CLOUD_TOKEN: &str = "HEIMDEX_CLOUD_TOKEN";
pub const ENV_CLOUD_ORG_SLUG: &str = "HEIMDEX_CLOUD_ORG_SLUG";
pub const ENV_CLOUD_LIBRARY_ID: &str = "HEIMDEX_CLOUD_LIBRARY_ID";

/// Cloud ingest settings; present only when both base URL and token are set.
#[derive(Debug, Clone)]
pub struct CloudConfig {
    pub base_url: String,
    pub token: String,
    pub org_slug: Option<String>,
    /// Library used when the per-source mapping cannot be resolved.
    pub fallback_library_id: Option<String>,
}

/// Full agent configuration resolved at startup.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub port: u16,
    pub log_level: String,
    pub data_dir: PathBuf,

    pub pipelines_python: Option<String>,
    pub pipelines_module: String,
    pub doctor_timeout: Duration,
    pub speech_timeout: Duration,
    pub faces_timeout: Duration,
    pub scenes_timeout: Duration,

    pub ocr_enabled: bool,
    pub ocr_redact_pii: bool,
    /// Advanced: start the faces pipeline while speech is still running.
    pub faces_parallel_with_speech: bool,

    pub cloud: Option<CloudConfig>,
}

impl AgentConfig {
    /// Load configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = match lookup(ENV_PORT) {
            Some(raw) => {
                let port: u32 = raw
                    .parse()
                    .map_err(|_| Error::config(ENV_PORT, format!("{raw:?} is not a number")))?;
                if port < 1 || port > 65535 {
                    return Err(Error::config(
                        ENV_PORT,
                        "port must be between 1 and 65535",
                    ));
                }
                port as u16
            }
            None => DEFAULT_PORT,
        };

        let log_level = lookup(ENV_LOG_LEVEL).unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

        let data_dir = match lookup(ENV_DATA_DIR) {
            Some(dir) => PathBuf::from(dir),
            None => default_data_dir(),
        };

        let cloud = match (lookup(ENV_CLOUD_BASE_URL), lookup(ENV_CLOUD_TOKEN)) {
            (Some(base_url), Some(token)) if !base_url.is_empty() && !token.is_empty() => {
                Some(CloudConfig {
                    base_url,
                    token,
                    org_slug: lookup(ENV_CLOUD_ORG_SLUG).filter(|s| !s.is_empty()),
                    fallback_library_id: lookup(ENV_CLOUD_LIBRARY_ID).filter(|s| !s.is_empty()),
                })
            }
            _ => None,
        };

        Ok(Self {
            port,
            log_level,
            data_dir,
            pipelines_python: lookup(ENV_PIPELINES_PYTHON).filter(|s| !s.is_empty()),
            pipelines_module: lookup(ENV_PIPELINES_MODULE)
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_PIPELINES_MODULE.to_string()),
            doctor_timeout: timeout_secs(&lookup, ENV_TIMEOUT_DOCTOR, DEFAULT_DOCTOR_TIMEOUT_SECS)?,
            speech_timeout: timeout_secs(&lookup, ENV_TIMEOUT_SPEECH, DEFAULT_SPEECH_TIMEOUT_SECS)?,
            faces_timeout: timeout_secs(&lookup, ENV_TIMEOUT_FACES, DEFAULT_FACES_TIMEOUT_SECS)?,
            scenes_timeout: timeout_secs(&lookup, ENV_TIMEOUT_SCENES, DEFAULT_SCENES_TIMEOUT_SECS)?,
            ocr_enabled: flag(&lookup, ENV_OCR_ENABLED),
            ocr_redact_pii: flag(&lookup, ENV_OCR_REDACT_PII),
            faces_parallel_with_speech: flag(&lookup, ENV_FACES_PARALLEL),
            cloud,
        })
    }

    /// Full path to the SQLite database file.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILENAME)
    }

    /// Base directory for pipeline output artifacts.
    pub fn artifacts_dir(&self) -> PathBuf {
        self.data_dir.join("artifacts")
    }
}

fn timeout_secs<F>(lookup: &F, key: &str, default_secs: u64) -> Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => {
            let secs: u64 = raw
                .parse()
                .map_err(|_| Error::config(key, format!("{raw:?} is not a number of seconds")))?;
            if secs == 0 {
                return Err(Error::config(key, "timeout must be nonzero"));
            }
            Ok(Duration::from_secs(secs))
        }
        None => Ok(Duration::from_secs(default_secs)),
    }
}

fn flag<F>(lookup: &F, key: &str) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    matches!(
        lookup(key).as_deref().map(str::to_ascii_lowercase).as_deref(),
        Some("1") | Some("true") | Some("yes")
    )
}

/// Default data directory: `~/.heimdex`, falling back to a relative
/// directory when the home directory cannot be determined.
fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(DEFAULT_DATA_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR_NAME))
}
