//! heimdex-agent library interface
//!
//! Exposes the agent's components and router construction for the binary
//! and for integration tests.

pub mod api;
pub mod cloud;
pub mod db;
pub mod error;
pub mod export;
pub mod models;
pub mod pipelines;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use crate::pipelines::CachedDoctor;
use crate::services::{CatalogService, JobOrchestrator};
use axum::middleware;
use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub catalog: CatalogService,
    pub orchestrator: Arc<JobOrchestrator>,
    pub doctor: Option<Arc<CachedDoctor>>,
    pub device_id: String,
    pub started_at: DateTime<Utc>,
}

/// Build the application router: `/health` open, everything else behind
/// bearer-token auth.
pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .merge(api::status::routes())
        .merge(api::sources::routes())
        .merge(api::jobs::routes())
        .merge(api::playback::routes())
        .merge(api::export::routes())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::auth::require_bearer,
        ));

    Router::new()
        .merge(api::health::routes())
        .merge(protected)
        .with_state(state)
}
