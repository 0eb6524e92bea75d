//! TTL-cached capability probe
//!
//! Wraps `run_doctor` so the poll loop consults capabilities once per job
//! instead of paying a subprocess per step, and so the status endpoint can
//! read the snapshot without ever blocking on a probe.

use crate::pipelines::runner::{PipelineError, PipelineExecutor};
use crate::pipelines::types::Capabilities;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

pub struct CachedDoctor {
    executor: Arc<dyn PipelineExecutor>,
    ttl: chrono::Duration,
    cached: RwLock<Option<Capabilities>>,
}

impl CachedDoctor {
    pub fn new(executor: Arc<dyn PipelineExecutor>) -> Self {
        Self::with_ttl(executor, DEFAULT_CACHE_TTL)
    }

    pub fn with_ttl(executor: Arc<dyn PipelineExecutor>, ttl: Duration) -> Self {
        Self {
            executor,
            ttl: chrono::Duration::from_std(ttl)
                .unwrap_or_else(|_| chrono::Duration::days(365)),
            cached: RwLock::new(None),
        }
    }

    /// Return cached capabilities if fresh, otherwise re-probe.
    pub async fn get(&self, cancel: &CancellationToken) -> Result<Capabilities, PipelineError> {
        {
            let guard = self.cached.read().await;
            if let Some(caps) = guard.as_ref() {
                if Utc::now() - caps.probed_at < self.ttl {
                    return Ok(caps.clone());
                }
            }
        }

        self.refresh(cancel).await
    }

    /// Non-blocking snapshot read; may be stale or absent.
    pub fn peek(&self) -> Option<Capabilities> {
        match self.cached.try_read() {
            Ok(guard) => guard.clone(),
            Err(_) => None,
        }
    }

    /// Force a new probe regardless of cache freshness. A failed probe
    /// falls back to the stale snapshot when one exists.
    pub async fn refresh(&self, cancel: &CancellationToken) -> Result<Capabilities, PipelineError> {
        let mut guard = self.cached.write().await;

        match self.executor.run_doctor(cancel.clone()).await {
            Ok(caps) => {
                *guard = Some(caps.clone());
                Ok(caps)
            }
            Err(e) => {
                tracing::warn!(error = %e, "doctor probe failed");
                if let Some(stale) = guard.as_ref() {
                    tracing::info!("returning stale capabilities cache");
                    return Ok(stale.clone());
                }
                Err(e)
            }
        }
    }

    /// Drop the cached snapshot.
    pub async fn invalidate(&self) {
        *self.cached.write().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipelines::types::{DoctorReport, PipelinesInfo, RunResult};
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ProbeCounter {
        probes: AtomicUsize,
        /// Probes at or beyond this index fail (0 = always fail).
        fail_from: usize,
        artifacts: PathBuf,
    }

    impl ProbeCounter {
        fn new(fail_from: usize) -> Self {
            Self {
                probes: AtomicUsize::new(0),
                fail_from,
                artifacts: PathBuf::from("/tmp"),
            }
        }
    }

    #[async_trait]
    impl PipelineExecutor for ProbeCounter {
        async fn run_doctor(
            &self,
            _cancel: CancellationToken,
        ) -> Result<Capabilities, PipelineError> {
            let n = self.probes.fetch_add(1, Ordering::SeqCst);
            if n >= self.fail_from {
                return Err(PipelineError::Doctor("probe blew up".into()));
            }
            let report = DoctorReport {
                pipelines: Some(PipelinesInfo {
                    speech: true,
                    faces: true,
                    scenes: true,
                    ocr: false,
                }),
                ..DoctorReport::default()
            };
            Ok(Capabilities::derive(report))
        }

        async fn run_speech(
            &self,
            _video: &Path,
            _out: &Path,
            _cancel: CancellationToken,
        ) -> Result<RunResult, PipelineError> {
            unimplemented!()
        }

        async fn run_faces(
            &self,
            _video: &Path,
            _out: &Path,
            _cancel: CancellationToken,
        ) -> Result<RunResult, PipelineError> {
            unimplemented!()
        }

        async fn run_scenes(
            &self,
            _request: crate::pipelines::runner::ScenesRequest,
            _cancel: CancellationToken,
        ) -> Result<RunResult, PipelineError> {
            unimplemented!()
        }

        fn artifacts_dir(&self) -> &Path {
            &self.artifacts
        }
    }

    #[tokio::test]
    async fn fresh_cache_avoids_reprobe() {
        let executor = Arc::new(ProbeCounter::new(usize::MAX));
        let doctor = CachedDoctor::new(executor.clone());
        let cancel = CancellationToken::new();

        assert!(doctor.peek().is_none());

        let caps = doctor.get(&cancel).await.unwrap();
        assert!(caps.has_speech);
        let _ = doctor.get(&cancel).await.unwrap();

        assert_eq!(executor.probes.load(Ordering::SeqCst), 1);
        assert!(doctor.peek().is_some());
    }

    #[tokio::test]
    async fn expired_cache_reprobes() {
        let executor = Arc::new(ProbeCounter::new(usize::MAX));
        let doctor = CachedDoctor::with_ttl(executor.clone(), Duration::from_millis(0));
        let cancel = CancellationToken::new();

        let _ = doctor.get(&cancel).await.unwrap();
        let _ = doctor.get(&cancel).await.unwrap();

        assert_eq!(executor.probes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_probe_without_cache_errors() {
        let doctor = CachedDoctor::new(Arc::new(ProbeCounter::new(0)));
        let cancel = CancellationToken::new();

        assert!(doctor.get(&cancel).await.is_err());
    }

    #[tokio::test]
    async fn failed_refresh_serves_stale_snapshot() {
        // First probe succeeds, every later probe fails.
        let executor = Arc::new(ProbeCounter::new(1));
        let doctor = CachedDoctor::with_ttl(executor.clone(), Duration::from_secs(300));
        let cancel = CancellationToken::new();

        let _ = doctor.get(&cancel).await.unwrap();

        let stale = doctor.refresh(&cancel).await.unwrap();
        assert!(stale.has_speech);
        assert_eq!(executor.probes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalidate_drops_snapshot() {
        let executor = Arc::new(ProbeCounter::new(usize::MAX));
        let doctor = CachedDoctor::new(executor.clone());
        let cancel = CancellationToken::new();

        let _ = doctor.get(&cancel).await.unwrap();
        doctor.invalidate().await;
        assert!(doctor.peek().is_none());

        let _ = doctor.get(&cancel).await.unwrap();
        assert_eq!(executor.probes.load(Ordering::SeqCst), 2);
    }
}
