//! Pipeline orchestrator: batch intake, record store, and the single
//! consumer that drives every record through thumbnail + transcode.
//!
//! Serialization is policy, not accident: the engine instance has one
//! virtual workspace, so all records funnel through one FIFO queue with one
//! consumer, and batches submitted while an earlier batch drains append to
//! the same queue. A record failing never aborts the batch; its error is
//! downgraded to a record-level status with a cause message.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;
use tokio::sync::{Notify, mpsc};

use crate::blob::{Blob, BlobHandle, HandleStore};
use crate::engine::{
    DEFAULT_ARTIFACT_ORIGIN, EngineHandle, EngineLoader, EngineState, HttpEngineLoader, ProgressFn,
};
use crate::error::AppError;
use crate::record::{RecordId, RecordStatus, SourceFile, VideoRecord};
use crate::store::RecordStore;
use crate::thumbnail::{DEFAULT_THUMBNAIL_OFFSET_SECS, extract_thumbnail};
use crate::transcode::transcode;
use crate::validate::{validate_source, warn_if_oversized};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Versioned origin the engine artifacts are fetched from.
    pub artifact_origin: String,
    /// Output container for every transcode. Fixed to MP4 for web delivery.
    pub output_format: String,
    /// Where in the clip the preview frame is taken.
    pub thumbnail_offset_secs: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            artifact_origin: DEFAULT_ARTIFACT_ORIGIN.to_string(),
            output_format: "mp4".to_string(),
            thumbnail_offset_secs: DEFAULT_THUMBNAIL_OFFSET_SECS,
        }
    }
}

struct Shared {
    config: PipelineConfig,
    engine: EngineHandle,
    store: RwLock<RecordStore>,
    handles: HandleStore,
    pending: AtomicUsize,
    idle: Notify,
}

/// Session-scoped orchestrator. Owns the record store (sole writer) and the
/// engine handle. Observers read cloned snapshots; blob bytes are shared.
pub struct Pipeline {
    shared: Arc<Shared>,
    queue: mpsc::UnboundedSender<RecordId>,
    worker: tokio::task::JoinHandle<()>,
}

impl Pipeline {
    /// Pipeline with the production HTTP-loaded engine. Must be created
    /// inside a tokio runtime; the consumer task is spawned here.
    pub fn new(config: PipelineConfig) -> Self {
        let loader = HttpEngineLoader::new(config.artifact_origin.clone());
        Self::with_loader(config, Box::new(loader))
    }

    /// Pipeline with an injected engine loader (tests, alternate backends).
    pub fn with_loader(config: PipelineConfig, loader: Box<dyn EngineLoader>) -> Self {
        let shared = Arc::new(Shared {
            config,
            engine: EngineHandle::new(loader),
            store: RwLock::new(RecordStore::new()),
            handles: HandleStore::new(),
            pending: AtomicUsize::new(0),
            idle: Notify::new(),
        });
        let (queue, mut rx) = mpsc::unbounded_channel::<RecordId>();
        let worker = {
            let shared = Arc::clone(&shared);
            tokio::spawn(async move {
                while let Some(id) = rx.recv().await {
                    shared.process_record(&id).await;
                    shared.pending.fetch_sub(1, Ordering::AcqRel);
                    shared.idle.notify_waiters();
                }
            })
        };
        Self {
            shared,
            queue,
            worker,
        }
    }

    /// Accept a batch of files. Every file gets a record in submission
    /// order (validation failures surface when the record is processed, so
    /// each record still reaches a terminal status). Engine load is
    /// triggered once for the batch; processing starts as soon as the
    /// consumer and the engine are ready.
    pub fn submit_batch(&self, files: Vec<SourceFile>) -> Vec<RecordId> {
        let mut ids = Vec::with_capacity(files.len());
        {
            let mut store = self.shared.store.write();
            for source in files {
                warn_if_oversized(&source);
                let preview = self.shared.handles.allocate(source.as_blob());
                let record = VideoRecord::new(source, preview);
                log::info!(
                    target: "vidpipe::pipeline",
                    "Accepted {} ({:.1} MB) as record {}",
                    record.source.name,
                    record.source.size_mb(),
                    record.id
                );
                ids.push(record.id.clone());
                store.insert(record);
            }
        }

        self.shared.pending.fetch_add(ids.len(), Ordering::AcqRel);
        for id in &ids {
            if self.queue.send(id.clone()).is_err() {
                log::error!(target: "vidpipe::pipeline", "Consumer is gone; record {} will not process", id);
                self.shared.pending.fetch_sub(1, Ordering::AcqRel);
            }
        }

        // Warm the engine once per batch without blocking submission;
        // concurrent batches collapse into the same in-flight load.
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            if let Err(e) = shared.engine.ensure_ready().await {
                log::warn!(target: "vidpipe::pipeline", "Batch engine warmup failed: {}", e);
            }
        });

        ids
    }

    /// Remove a record, revoking its preview and thumbnail handles exactly
    /// once. If the record's engine job is still in flight, the consumer
    /// discards the result when it completes. Removing an unknown id is a
    /// no-op.
    pub fn remove_record(&self, id: &str) -> bool {
        let removed = self.shared.store.write().remove(id);
        match removed {
            Some(record) => {
                self.shared.handles.revoke(record.preview);
                if let Some(thumbnail) = record.thumbnail {
                    self.shared.handles.revoke(thumbnail);
                }
                log::info!(target: "vidpipe::pipeline", "Removed record {}", id);
                true
            }
            None => false,
        }
    }

    /// Write a Ready record's output blob as `converted_<stem>.<format>`
    /// into `dir` through a transient handle that is released afterward.
    pub fn save_artifact(&self, id: &str, dir: &Path) -> Result<PathBuf, AppError> {
        let (output, file_name) = {
            let store = self.shared.store.read();
            let record = store
                .get(id)
                .ok_or_else(|| AppError::UnknownRecord(id.to_string()))?;
            let output = record
                .output
                .clone()
                .ok_or_else(|| AppError::NotReady(id.to_string()))?;
            let file_name = format!(
                "converted_{}.{}",
                record.source.stem(),
                self.shared.config.output_format
            );
            (output, file_name)
        };

        let transient = self.shared.handles.allocate(output);
        let result = self.write_handle_to(transient, &dir.join(file_name));
        self.shared.handles.revoke(transient);
        result
    }

    fn write_handle_to(&self, handle: BlobHandle, path: &Path) -> Result<PathBuf, AppError> {
        let blob = self
            .shared
            .handles
            .resolve(handle)
            .ok_or_else(|| AppError::NotReady(path.display().to_string()))?;
        std::fs::write(path, blob.bytes())?;
        log::info!(
            target: "vidpipe::pipeline",
            "Saved artifact to {} ({} bytes)",
            path.display(),
            blob.size
        );
        Ok(path.to_path_buf())
    }

    /// Snapshot of one record.
    pub fn record(&self, id: &str) -> Option<VideoRecord> {
        self.shared.store.read().get(id).cloned()
    }

    /// Snapshot of all records in submission order.
    pub fn records(&self) -> Vec<VideoRecord> {
        self.shared.store.read().iter_ordered().cloned().collect()
    }

    /// Engine progress for a record's in-flight job, 0-100.
    pub fn progress(&self, id: &str) -> Option<u8> {
        self.shared.store.read().get(id).map(|r| r.progress)
    }

    /// Resolve a preview or thumbnail handle to its blob.
    pub fn resolve_handle(&self, handle: BlobHandle) -> Option<Blob> {
        self.shared.handles.resolve(handle)
    }

    pub fn engine_state(&self) -> EngineState {
        self.shared.engine.state()
    }

    /// Wait until every queued record has reached a terminal status.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            // Register before checking so a wakeup between the check and the
            // await is not lost.
            notified.as_mut().enable();
            if self.shared.pending.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

impl Shared {
    async fn process_record(self: &Arc<Self>, id: &str) {
        // Snapshot under a short lock; never hold it across an engine await.
        let source = {
            let mut store = self.store.write();
            match store.get_mut(id) {
                Some(record) => {
                    record.status = RecordStatus::Processing;
                    record.source.clone()
                }
                // Removed while still queued.
                None => return,
            }
        };
        log::info!(target: "vidpipe::pipeline", "Processing record {} ({})", id, source.name);

        if let Err(e) = validate_source(&source) {
            self.fail_record(id, &e);
            return;
        }

        let progress = self.progress_sink(id);
        let thumbnail = match extract_thumbnail(
            &self.engine,
            &source,
            self.config.thumbnail_offset_secs,
            Some(progress.clone()),
        )
        .await
        {
            Ok(blob) => blob,
            Err(e) => {
                self.fail_record(id, &e);
                return;
            }
        };

        let output = match transcode(&self.engine, &source, &self.config.output_format, Some(progress)).await
        {
            Ok(blob) => blob,
            Err(e) => {
                self.fail_record(id, &e);
                return;
            }
        };

        let mut store = self.store.write();
        match store.get_mut(id) {
            Some(record) => {
                record.thumbnail = Some(self.handles.allocate(thumbnail));
                record.output = Some(output);
                record.progress = 100;
                record.status = RecordStatus::Ready;
                log::info!(target: "vidpipe::pipeline", "Record {} ready", id);
            }
            None => {
                // Removed while the engine job was in flight; the produced
                // blobs are dropped here and never enter the handle store.
                log::debug!(
                    target: "vidpipe::pipeline",
                    "Record {} removed mid-job; discarding artifacts",
                    id
                );
            }
        }
    }

    fn fail_record(&self, id: &str, error: &AppError) {
        let mut store = self.store.write();
        match store.get_mut(id) {
            Some(record) => {
                log::warn!(target: "vidpipe::pipeline", "Record {} failed: {}", id, error);
                record.status = RecordStatus::Error {
                    message: error.summary(),
                };
            }
            None => {
                log::debug!(
                    target: "vidpipe::pipeline",
                    "Record {} removed mid-job; discarding error: {}",
                    id,
                    error
                );
            }
        }
    }

    /// Per-job progress sink writing into the record being processed.
    fn progress_sink(self: &Arc<Self>, id: &str) -> ProgressFn {
        let shared = Arc::clone(self);
        let id = id.to_string();
        Arc::new(move |percent| {
            let mut store = shared.store.write();
            if let Some(record) = store.get_mut(&id) {
                record.progress = percent;
            }
        })
    }
}
