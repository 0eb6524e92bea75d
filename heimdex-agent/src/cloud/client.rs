//! HTTP client for the Heimdex ingest service

use crate::cloud::types::{LibraryInfo, SceneIngestPayload, SceneIngestResponse, UploadError};
use async_trait::async_trait;
use reqwest::header;
use std::time::Duration;
use uuid::Uuid;

const USER_AGENT: &str = concat!("heimdex-agent/", env!("CARGO_PKG_VERSION"));
const HTTP_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_ERROR_BODY_BYTES: usize = 4096;

/// Ingest operations the orchestrator depends on.
#[async_trait]
pub trait CloudIngest: Send + Sync {
    async fn upload_scenes(
        &self,
        payload: &SceneIngestPayload,
    ) -> Result<SceneIngestResponse, UploadError>;

    /// Look up a library by name on the ingest side, creating it if absent.
    async fn get_or_create_library(&self, name: &str) -> Result<LibraryInfo, UploadError>;
}

#[derive(Debug, Clone)]
pub struct IngestClientConfig {
    pub base_url: String,
    pub token: String,
    /// Org slug used as a Host-header subdomain for tenancy resolution.
    pub org_slug: Option<String>,
    pub device_id: Option<String>,
}

pub struct IngestClient {
    cfg: IngestClientConfig,
    http: reqwest::Client,
}

impl IngestClient {
    pub fn new(cfg: IngestClientConfig) -> Result<Self, UploadError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| UploadError::Network(e.to_string()))?;

        Ok(Self { cfg, http })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.cfg.base_url.trim_end_matches('/'), path);
        let mut req = self
            .http
            .request(method, url)
            .bearer_auth(&self.cfg.token)
            .header("X-Heimdex-Request-Id", Uuid::new_v4().to_string());

        if let Some(device_id) = &self.cfg.device_id {
            req = req.header("X-Heimdex-Device-Id", device_id);
        }
        // The service resolves the org from the Host header subdomain.
        if let Some(org) = &self.cfg.org_slug {
            req = req.header(header::HOST, format!("{org}.app.heimdex.co"));
        }

        req
    }
}

async fn error_body(response: reqwest::Response) -> String {
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY_BYTES {
        let mut idx = MAX_ERROR_BODY_BYTES;
        while !body.is_char_boundary(idx) {
            idx -= 1;
        }
        body.truncate(idx);
    }
    body
}

#[async_trait]
impl CloudIngest for IngestClient {
    async fn upload_scenes(
        &self,
        payload: &SceneIngestPayload,
    ) -> Result<SceneIngestResponse, UploadError> {
        tracing::info!(
            video_id = %payload.video_id,
            library_id = %payload.library_id,
            scene_count = payload.scenes.len(),
            "uploading scenes to cloud"
        );

        let response = self
            .request(reqwest::Method::POST, "/api/ingest/scenes")
            .json(payload)
            .send()
            .await
            .map_err(|e| UploadError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::Http {
                status: status.as_u16(),
                body: error_body(response).await,
            });
        }

        let result: SceneIngestResponse = response.json().await.unwrap_or_default();
        tracing::info!(
            video_id = %result.video_id,
            indexed_count = result.indexed_count,
            skipped_count = result.skipped_count,
            "scene upload succeeded"
        );

        Ok(result)
    }

    async fn get_or_create_library(&self, name: &str) -> Result<LibraryInfo, UploadError> {
        let response = self
            .request(reqwest::Method::POST, "/api/libraries")
            .json(&serde_json::json!({ "name": name }))
            .send()
            .await
            .map_err(|e| UploadError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::Http {
                status: status.as_u16(),
                body: error_body(response).await,
            });
        }

        response
            .json()
            .await
            .map_err(|e| UploadError::Network(format!("unmarshal library response: {e}")))
    }
}
