//! Engine lifecycle and the seams the rest of the crate talks through.
//!
//! The engine is a sandboxed multimedia runtime with exactly one virtual
//! workspace: it cannot service two jobs at once. `EngineHandle` owns the
//! process-wide instance, loads it lazily from remote artifacts, and hands
//! out a job guard so callers serialize workspace use explicitly instead of
//! by accident of call ordering.

pub mod loader;
pub mod process;
mod progress;

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use async_trait::async_trait;

use crate::error::AppError;

pub use loader::{
    ArtifactFetcher, DEFAULT_ARTIFACT_ORIGIN, EngineArtifacts, HttpArtifactFetcher,
    HttpEngineLoader,
};
pub use process::ProcessEngine;
pub use progress::parse_engine_progress;

/// Per-job progress sink, integer percent 0-100. Attributed to exactly one
/// record because at most one engine job runs at a time.
pub type ProgressFn = Arc<dyn Fn(u8) + Send + Sync>;

/// A loaded engine instance. One virtual workspace, one job at a time;
/// callers go through `EngineHandle::begin_job` before touching it.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Write bytes into the workspace under `name`.
    async fn write_file(&self, name: &str, bytes: &[u8]) -> Result<(), AppError>;

    /// Read a workspace entry produced by a pipeline run.
    async fn read_file(&self, name: &str) -> Result<Vec<u8>, AppError>;

    /// Remove a workspace entry. Removing a missing entry is not an error.
    async fn delete_file(&self, name: &str) -> Result<(), AppError>;

    /// Run one pipeline invocation. Nonzero exit surfaces as
    /// `AppError::PipelineFailed`; workers re-tag it for their operation.
    async fn exec(&self, args: &[String], progress: Option<ProgressFn>) -> Result<(), AppError>;
}

/// Produces a ready engine instance: fetch artifacts, instantiate. Injected
/// so tests can substitute a scripted engine.
#[async_trait]
pub trait EngineLoader: Send + Sync {
    async fn load(&self) -> Result<Arc<dyn Engine>, AppError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EngineState {
    NotLoaded,
    Loading,
    Loaded,
}

const STATE_NOT_LOADED: u8 = 0;
const STATE_LOADING: u8 = 1;
const STATE_LOADED: u8 = 2;

/// Owns the singleton engine instance for the session.
///
/// `ensure_ready` is idempotent and collapses concurrent callers into a
/// single in-flight load: the load runs while the slot mutex is held, so
/// overlapping callers queue on the mutex and find the instance (or retry
/// after a failed attempt) instead of racing independent loads.
pub struct EngineHandle {
    loader: Box<dyn EngineLoader>,
    slot: tokio::sync::Mutex<Option<Arc<dyn Engine>>>,
    state: AtomicU8,
    job_lock: tokio::sync::Mutex<()>,
}

impl EngineHandle {
    pub fn new(loader: Box<dyn EngineLoader>) -> Self {
        Self {
            loader,
            slot: tokio::sync::Mutex::new(None),
            state: AtomicU8::new(STATE_NOT_LOADED),
            job_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Observable readiness state. Loaded is terminal for the session.
    pub fn state(&self) -> EngineState {
        match self.state.load(Ordering::Acquire) {
            STATE_LOADED => EngineState::Loaded,
            STATE_LOADING => EngineState::Loading,
            _ => EngineState::NotLoaded,
        }
    }

    /// Load the engine if it is not loaded yet and return the instance.
    /// On failure the handle reverts to NotLoaded and the caller may retry.
    pub async fn ensure_ready(&self) -> Result<Arc<dyn Engine>, AppError> {
        let mut slot = self.slot.lock().await;
        if let Some(engine) = slot.as_ref() {
            return Ok(Arc::clone(engine));
        }

        self.state.store(STATE_LOADING, Ordering::Release);
        log::info!(target: "vidpipe::engine", "Loading processing engine");
        match self.loader.load().await {
            Ok(engine) => {
                *slot = Some(Arc::clone(&engine));
                self.state.store(STATE_LOADED, Ordering::Release);
                log::info!(target: "vidpipe::engine", "Engine loaded");
                Ok(engine)
            }
            Err(e) => {
                self.state.store(STATE_NOT_LOADED, Ordering::Release);
                log::warn!(
                    target: "vidpipe::engine",
                    "Engine load failed, will retry on next call: {}",
                    e
                );
                Err(e)
            }
        }
    }

    /// Exclusive claim on the engine workspace for one job. Held across the
    /// whole write/exec/read/cleanup sequence.
    pub async fn begin_job(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.job_lock.lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct NoopEngine;

    #[async_trait]
    impl Engine for NoopEngine {
        async fn write_file(&self, _name: &str, _bytes: &[u8]) -> Result<(), AppError> {
            Ok(())
        }
        async fn read_file(&self, _name: &str) -> Result<Vec<u8>, AppError> {
            Ok(Vec::new())
        }
        async fn delete_file(&self, _name: &str) -> Result<(), AppError> {
            Ok(())
        }
        async fn exec(&self, _args: &[String], _progress: Option<ProgressFn>) -> Result<(), AppError> {
            Ok(())
        }
    }

    struct CountingLoader {
        loads: AtomicUsize,
        fail_first: AtomicUsize,
    }

    impl CountingLoader {
        fn new(failures: usize) -> Self {
            Self {
                loads: AtomicUsize::new(0),
                fail_first: AtomicUsize::new(failures),
            }
        }
    }

    #[async_trait]
    impl EngineLoader for Arc<CountingLoader> {
        async fn load(&self) -> Result<Arc<dyn Engine>, AppError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            // Yield so overlapping callers actually overlap the attempt.
            tokio::task::yield_now().await;
            if self.fail_first.load(Ordering::SeqCst) > 0 {
                self.fail_first.fetch_sub(1, Ordering::SeqCst);
                return Err(AppError::engine_load("artifact fetch failed"));
            }
            Ok(Arc::new(NoopEngine))
        }
    }

    #[tokio::test]
    async fn concurrent_ensure_ready_loads_once() {
        let loader = Arc::new(CountingLoader::new(0));
        let handle = Arc::new(EngineHandle::new(Box::new(Arc::clone(&loader))));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let handle = Arc::clone(&handle);
            tasks.push(tokio::spawn(async move { handle.ensure_ready().await.is_ok() }));
        }
        for task in tasks {
            assert!(task.await.expect("task panicked"));
        }

        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
        assert_eq!(handle.state(), EngineState::Loaded);
    }

    #[tokio::test]
    async fn failed_load_reverts_and_retry_succeeds() {
        let loader = Arc::new(CountingLoader::new(1));
        let handle = EngineHandle::new(Box::new(Arc::clone(&loader)));

        let err = match handle.ensure_ready().await {
            Ok(_) => panic!("first load must fail"),
            Err(e) => e,
        };
        assert!(matches!(err, AppError::EngineLoad(_)));
        assert_eq!(handle.state(), EngineState::NotLoaded);

        handle.ensure_ready().await.expect("retry should succeed");
        assert_eq!(handle.state(), EngineState::Loaded);
        assert_eq!(loader.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn ensure_ready_after_load_reuses_instance() {
        let loader = Arc::new(CountingLoader::new(0));
        let handle = EngineHandle::new(Box::new(Arc::clone(&loader)));

        handle.ensure_ready().await.expect("load");
        handle.ensure_ready().await.expect("reuse");
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    }
}
