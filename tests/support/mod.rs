#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use vidpipe::AppError;
use vidpipe::engine::{Engine, EngineLoader, ProgressFn};
use vidpipe::record::SourceFile;

/// Marker bytes a test can embed in a source to script engine failures.
pub const CORRUPT_MARKER: &[u8] = b"CORRUPT";
/// Fails only the encode pipeline; thumbnail extraction still succeeds.
pub const BAD_ENCODE_MARKER: &[u8] = b"BADENCODE";

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Scripted in-memory engine. The workspace is a plain name -> bytes map so
/// tests can assert that every job cleans up after itself.
pub struct FakeEngine {
    files: Mutex<HashMap<String, Vec<u8>>>,
    /// Args of every exec, in order.
    pub exec_log: Mutex<Vec<Vec<String>>>,
    /// Input bytes seen by every exec, in order. Used for ordering asserts.
    pub exec_inputs: Mutex<Vec<Vec<u8>>>,
    pub execs_started: AtomicUsize,
    /// When set, each exec waits for one permit before finishing.
    pub exec_gate: Option<Arc<Semaphore>>,
    /// When set, every delete_file fails with a permission error.
    pub fail_delete: bool,
    counter: AtomicUsize,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            files: Mutex::new(HashMap::new()),
            exec_log: Mutex::new(Vec::new()),
            exec_inputs: Mutex::new(Vec::new()),
            execs_started: AtomicUsize::new(0),
            exec_gate: None,
            fail_delete: false,
            counter: AtomicUsize::new(0),
        }
    }

    pub fn gated() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let mut engine = Self::new();
        engine.exec_gate = Some(Arc::clone(&gate));
        (engine, gate)
    }

    pub fn failing_delete() -> Self {
        let mut engine = Self::new();
        engine.fail_delete = true;
        engine
    }

    pub fn workspace_len(&self) -> usize {
        self.files.lock().len()
    }

    pub fn exec_count(&self) -> usize {
        self.exec_log.lock().len()
    }
}

#[async_trait]
impl Engine for FakeEngine {
    async fn write_file(&self, name: &str, bytes: &[u8]) -> Result<(), AppError> {
        self.files.lock().insert(name.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn read_file(&self, name: &str) -> Result<Vec<u8>, AppError> {
        self.files.lock().get(name).cloned().ok_or_else(|| {
            AppError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no workspace entry {}", name),
            ))
        })
    }

    async fn delete_file(&self, name: &str) -> Result<(), AppError> {
        if self.fail_delete {
            return Err(AppError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("cannot delete {}", name),
            )));
        }
        self.files.lock().remove(name);
        Ok(())
    }

    async fn exec(&self, args: &[String], progress: Option<ProgressFn>) -> Result<(), AppError> {
        self.execs_started.fetch_add(1, Ordering::SeqCst);
        if let Some(ref gate) = self.exec_gate {
            gate.acquire().await.expect("gate closed").forget();
        }

        let input_name = args
            .iter()
            .position(|a| a == "-i")
            .and_then(|i| args.get(i + 1))
            .cloned()
            .ok_or_else(|| AppError::pipeline_failed(-1, "no -i argument"))?;
        let output_name = args
            .last()
            .cloned()
            .ok_or_else(|| AppError::pipeline_failed(-1, "no output argument"))?;
        let input = self.read_file(&input_name).await?;

        self.exec_log.lock().push(args.to_vec());
        self.exec_inputs.lock().push(input.clone());

        if let Some(ref cb) = progress {
            cb(50);
        }

        if contains(&input, CORRUPT_MARKER) {
            return Err(AppError::pipeline_failed(
                1,
                format!("{}: Invalid data found when processing input", input_name),
            ));
        }
        let is_thumbnail = output_name.ends_with(".jpg");
        if !is_thumbnail && contains(&input, BAD_ENCODE_MARKER) {
            return Err(AppError::pipeline_failed(
                1,
                "Conversion failed! Error while decoding stream",
            ));
        }

        let output = if is_thumbnail {
            let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0];
            bytes.extend_from_slice(&input[..input.len().min(8)]);
            bytes
        } else {
            // Every encode produces a distinct blob, even for a source
            // already in the target container.
            let run = self.counter.fetch_add(1, Ordering::SeqCst);
            let mut bytes = format!("encoded-{}:", run).into_bytes();
            bytes.extend_from_slice(&input);
            bytes
        };
        self.write_file(&output_name, &output).await?;

        if let Some(ref cb) = progress {
            cb(100);
        }
        Ok(())
    }
}

/// Injectable loader around a shared `FakeEngine`. Load attempts can be
/// gated (to overlap submissions with a slow load) and scripted to fail.
#[derive(Clone)]
pub struct FakeLoader {
    pub engine: Arc<FakeEngine>,
    pub loads: Arc<AtomicUsize>,
    pub load_gate: Option<Arc<Semaphore>>,
    pub fail_first: Arc<AtomicUsize>,
}

impl FakeLoader {
    pub fn new(engine: Arc<FakeEngine>) -> Self {
        Self {
            engine,
            loads: Arc::new(AtomicUsize::new(0)),
            load_gate: None,
            fail_first: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn gated(engine: Arc<FakeEngine>) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let mut loader = Self::new(engine);
        loader.load_gate = Some(Arc::clone(&gate));
        (loader, gate)
    }

    pub fn failing_first(engine: Arc<FakeEngine>, failures: usize) -> Self {
        let loader = Self::new(engine);
        loader.fail_first.store(failures, Ordering::SeqCst);
        loader
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EngineLoader for FakeLoader {
    async fn load(&self) -> Result<Arc<dyn Engine>, AppError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if let Some(ref gate) = self.load_gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        if self.fail_first.load(Ordering::SeqCst) > 0 {
            self.fail_first.fetch_sub(1, Ordering::SeqCst);
            return Err(AppError::engine_load("artifact fetch failed: HTTP 503"));
        }
        Ok(Arc::clone(&self.engine) as Arc<dyn Engine>)
    }
}

pub fn source(name: &str, mime: &str, bytes: &[u8]) -> SourceFile {
    SourceFile::new(name, mime, bytes.to_vec())
}

/// Poll until `check` passes or the deadline hits.
pub async fn wait_for(mut check: impl FnMut() -> bool, what: &str) {
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {}", what);
}
