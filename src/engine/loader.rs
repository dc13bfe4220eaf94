//! Remote artifact fetch and engine instantiation.
//!
//! The engine ships as two binary artifacts on a fixed versioned origin: a
//! runtime launcher script and the compute module it executes. Both are
//! fetched at first use; there is no offline fallback and no cache across
//! sessions.

use std::sync::Arc;

use async_trait::async_trait;

use super::process::ProcessEngine;
use super::{Engine, EngineLoader};
use crate::error::AppError;

/// Versioned origin the artifacts are pinned to.
pub const DEFAULT_ARTIFACT_ORIGIN: &str = "https://artifacts.vidpipe.dev/engine/0.12.6";

pub const RUNTIME_SCRIPT_NAME: &str = "engine-run.sh";
pub const COMPUTE_MODULE_NAME: &str = "engine-core.bin";

/// The two fetched binaries an engine instance is built from.
pub struct EngineArtifacts {
    pub runtime_script: Vec<u8>,
    pub compute_module: Vec<u8>,
}

/// Fetches one artifact by name from the configured origin.
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    async fn fetch(&self, name: &str) -> Result<Vec<u8>, AppError>;
}

pub struct HttpArtifactFetcher {
    client: reqwest::Client,
    origin: String,
}

impl HttpArtifactFetcher {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            origin: origin.into(),
        }
    }
}

#[async_trait]
impl ArtifactFetcher for HttpArtifactFetcher {
    async fn fetch(&self, name: &str) -> Result<Vec<u8>, AppError> {
        let url = format!("{}/{}", self.origin.trim_end_matches('/'), name);
        log::debug!(target: "vidpipe::engine::loader", "Fetching artifact {}", url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::engine_load(format!("fetching {}: {}", url, e)))?;
        if !response.status().is_success() {
            return Err(AppError::engine_load(format!(
                "fetching {}: HTTP {}",
                url,
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::engine_load(format!("reading {}: {}", url, e)))?;
        Ok(bytes.to_vec())
    }
}

/// Production loader: fetch both artifacts, then install and instantiate the
/// process-backed engine.
pub struct HttpEngineLoader {
    fetcher: Box<dyn ArtifactFetcher>,
}

impl HttpEngineLoader {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            fetcher: Box::new(HttpArtifactFetcher::new(origin)),
        }
    }

    pub fn with_fetcher(fetcher: Box<dyn ArtifactFetcher>) -> Self {
        Self { fetcher }
    }

    async fn fetch_artifacts(&self) -> Result<EngineArtifacts, AppError> {
        let (runtime_script, compute_module) = tokio::try_join!(
            self.fetcher.fetch(RUNTIME_SCRIPT_NAME),
            self.fetcher.fetch(COMPUTE_MODULE_NAME),
        )?;
        Ok(EngineArtifacts {
            runtime_script,
            compute_module,
        })
    }
}

#[async_trait]
impl EngineLoader for HttpEngineLoader {
    async fn load(&self) -> Result<Arc<dyn Engine>, AppError> {
        let artifacts = self.fetch_artifacts().await?;
        log::debug!(
            target: "vidpipe::engine::loader",
            "Fetched artifacts: runtime {} bytes, core {} bytes",
            artifacts.runtime_script.len(),
            artifacts.compute_module.len()
        );
        let engine = ProcessEngine::instantiate(artifacts).await?;
        Ok(Arc::new(engine))
    }
}
