//! Localhost HTTP API
//!
//! Bearer-token auth on everything except `/health`; errors use the
//! `{error, code}` JSON envelope from [`crate::error::ApiError`].

pub mod auth;
pub mod export;
pub mod health;
pub mod jobs;
pub mod playback;
pub mod sources;
pub mod status;
