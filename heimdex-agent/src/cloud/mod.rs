//! Cloud ingest client
//!
//! Forwards validated scene metadata to the remote ingest service and
//! resolves per-source library mappings. Upload errors are classified as
//! retryable (5xx, network, timeout) or permanent (other 4xx) so the
//! orchestrator can decide whether to schedule a retry job.

pub mod client;
pub mod types;

pub use client::{CloudIngest, IngestClient, IngestClientConfig};
pub use types::{LibraryInfo, SceneIngestDoc, SceneIngestPayload, SceneIngestResponse, UploadError};
