//! Bearer-token authentication middleware
//!
//! The expected token lives in the config table (`auth_token`, generated
//! on first start and printed in the startup banner).

use crate::db;
use crate::error::ApiError;
use crate::AppState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

pub async fn require_bearer(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("missing authorization header".to_string()))?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::Unauthorized("invalid authorization format".to_string()))?;

    let stored = db::settings::get_config(&state.db, "auth_token")
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "failed to get auth token from config");
            ApiError::Internal("auth configuration error".to_string())
        })?
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::Internal("auth configuration error".to_string()))?;

    if token != stored {
        tracing::warn!("invalid auth token presented");
        return Err(ApiError::Unauthorized("invalid token".to_string()));
    }

    Ok(next.run(request).await)
}
