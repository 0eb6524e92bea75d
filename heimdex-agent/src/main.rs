//! heimdex-agent - local video catalog and analysis agent
//!
//! Catalogs video files under user-registered sources, drives the Python
//! analysis pipelines through a durable job queue, serves a localhost API
//! for the companion UI, and syncs scene metadata to the cloud ingest
//! service when configured.

use anyhow::{Context, Result};
use heimdex_agent::cloud::{CloudIngest, IngestClient, IngestClientConfig};
use heimdex_agent::pipelines::{CachedDoctor, PipelineExecutor, RunnerConfig, SubprocessRunner};
use heimdex_agent::services::{
    CatalogService, FfmpegThumbnailer, JobOrchestrator, OrchestratorConfig, Thumbnailer,
};
use heimdex_agent::{build_router, AppState};
use heimdex_common::config::AgentConfig;
use rand::RngCore;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = AgentConfig::from_env().context("failed to load config")?;

    init_tracing(&cfg.log_level)?;

    std::fs::create_dir_all(&cfg.data_dir).context("failed to create data dir")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        data_dir = %cfg.data_dir.display(),
        "starting heimdex agent"
    );

    let db = heimdex_common::db::init_database(&cfg.db_path())
        .await
        .context("failed to initialize database")?;

    let device_id = ensure_identity(&db, "device_id").await?;
    let auth_token = ensure_identity(&db, "auth_token").await?;

    println!();
    println!("  heimdex agent v{}", env!("CARGO_PKG_VERSION"));
    println!("  API URL:    http://127.0.0.1:{}", cfg.port);
    println!("  Auth Token: {auth_token}");
    println!("  Device ID:  {}...", &device_id[..16]);
    println!();

    let catalog = CatalogService::new(db.clone());

    let cloud: Option<Arc<dyn CloudIngest>> = match &cfg.cloud {
        Some(cloud_cfg) => {
            info!(base_url = %cloud_cfg.base_url, "cloud sync enabled");
            let client = IngestClient::new(IngestClientConfig {
                base_url: cloud_cfg.base_url.clone(),
                token: cloud_cfg.token.clone(),
                org_slug: cloud_cfg.org_slug.clone(),
                device_id: Some(device_id.clone()),
            })
            .context("failed to build cloud client")?;
            Some(Arc::new(client))
        }
        None => {
            info!("cloud sync disabled");
            None
        }
    };

    let shutdown = CancellationToken::new();

    let mut pipelines: Option<(Arc<dyn PipelineExecutor>, Arc<CachedDoctor>)> = None;
    match SubprocessRunner::new(RunnerConfig::from_agent(&cfg)) {
        Ok(runner) => {
            let executor: Arc<dyn PipelineExecutor> = Arc::new(runner);
            let doctor = Arc::new(CachedDoctor::new(executor.clone()));

            match doctor.refresh(&shutdown).await {
                Ok(caps) => info!(
                    speech = caps.has_speech,
                    faces = caps.has_faces,
                    scenes = caps.has_scenes,
                    "pipeline capabilities detected"
                ),
                Err(e) => warn!(error = %e, "initial doctor probe failed"),
            }

            pipelines = Some((executor, doctor));
        }
        Err(e) => warn!(error = %e, "pipeline runner unavailable, indexing disabled"),
    }

    let thumbnailer: Option<Arc<dyn Thumbnailer>> = match FfmpegThumbnailer::new() {
        Ok(t) => Some(Arc::new(t)),
        Err(e) => {
            warn!(error = %e, "ffmpeg unavailable, thumbnails disabled");
            None
        }
    };

    let orchestrator_cfg = OrchestratorConfig {
        fallback_library_id: cfg
            .cloud
            .as_ref()
            .and_then(|c| c.fallback_library_id.clone()),
        ocr_enabled: cfg.ocr_enabled,
        ocr_redact_pii: cfg.ocr_redact_pii,
        faces_parallel_with_speech: cfg.faces_parallel_with_speech,
        ..OrchestratorConfig::default()
    };

    let mut orchestrator = JobOrchestrator::new(db.clone(), catalog.clone(), orchestrator_cfg);
    let doctor_handle = pipelines.as_ref().map(|(_, doctor)| doctor.clone());
    if let Some((executor, doctor)) = pipelines {
        orchestrator = orchestrator.with_pipelines(executor, doctor);
    }
    if let Some(cloud) = cloud {
        orchestrator = orchestrator.with_cloud(cloud);
    }
    if let Some(thumbnailer) = thumbnailer {
        orchestrator = orchestrator.with_thumbnailer(thumbnailer);
    }
    let orchestrator = Arc::new(orchestrator);

    {
        let orchestrator = orchestrator.clone();
        let cancel = shutdown.clone();
        tokio::spawn(async move {
            orchestrator.run(cancel).await;
        });
    }

    let state = AppState {
        db: db.clone(),
        catalog,
        orchestrator,
        doctor: doctor_handle,
        device_id,
        started_at: chrono::Utc::now(),
    };
    let app = build_router(state);

    let addr = format!("127.0.0.1:{}", cfg.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .context("HTTP server error")?;

    info!("initiating graceful shutdown");
    shutdown.cancel();
    db.close().await;
    info!("shutdown complete");

    Ok(())
}

fn init_tracing(level: &str) -> Result<()> {
    let level = match level.to_ascii_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Load a persisted identity value, generating and storing a fresh random
/// one on first start.
async fn ensure_identity(db: &SqlitePool, key: &str) -> Result<String> {
    if let Some(existing) = heimdex_agent::db::settings::get_config(db, key).await? {
        if !existing.is_empty() {
            return Ok(existing);
        }
    }

    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    let value: String = bytes.iter().map(|b| format!("{b:02x}")).collect();

    heimdex_agent::db::settings::set_config(db, key, &value).await?;
    Ok(value)
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received interrupt signal"),
        _ = terminate => info!("received terminate signal"),
    }

    cancel.cancel();
}
