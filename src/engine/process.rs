//! Process-backed engine instance.
//!
//! The fetched runtime script and compute module are installed into a
//! session-scoped directory; each pipeline invocation spawns the runtime
//! script with the job arguments and the workspace as its working directory.
//! Progress is parsed from the `-progress pipe:1` stream on stdout while the
//! duration banner and diagnostics arrive on stderr.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use super::loader::{COMPUTE_MODULE_NAME, EngineArtifacts, RUNTIME_SCRIPT_NAME};
use super::progress::parse_engine_progress;
use super::{Engine, ProgressFn};
use crate::error::AppError;

/// Keep only the last N bytes of stderr to avoid unbounded memory growth.
const MAX_STDERR_BYTES: usize = 64 * 1024;

pub struct ProcessEngine {
    /// Install dir for the fetched artifacts; removed on drop, which is the
    /// session teardown for the engine.
    install: tempfile::TempDir,
    runtime_path: PathBuf,
    workspace: PathBuf,
}

impl ProcessEngine {
    /// Install the artifacts and create the single virtual workspace.
    pub async fn instantiate(artifacts: EngineArtifacts) -> Result<Self, AppError> {
        let install = tempfile::tempdir()
            .map_err(|e| AppError::engine_load(format!("creating install dir: {}", e)))?;
        let runtime_path = install.path().join(RUNTIME_SCRIPT_NAME);
        let core_path = install.path().join(COMPUTE_MODULE_NAME);
        let workspace = install.path().join("workspace");

        tokio::fs::write(&runtime_path, &artifacts.runtime_script)
            .await
            .map_err(|e| AppError::engine_load(format!("installing runtime script: {}", e)))?;
        tokio::fs::write(&core_path, &artifacts.compute_module)
            .await
            .map_err(|e| AppError::engine_load(format!("installing compute module: {}", e)))?;
        tokio::fs::create_dir(&workspace)
            .await
            .map_err(|e| AppError::engine_load(format!("creating workspace: {}", e)))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            for path in [&runtime_path, &core_path] {
                tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
                    .await
                    .map_err(|e| AppError::engine_load(format!("marking executable: {}", e)))?;
            }
        }

        log::debug!(
            target: "vidpipe::engine::process",
            "Engine installed at {}",
            install.path().display()
        );
        Ok(Self {
            install,
            runtime_path,
            workspace,
        })
    }

    pub fn install_dir(&self) -> &Path {
        self.install.path()
    }

    pub fn workspace_dir(&self) -> &Path {
        &self.workspace
    }

    /// Workspace entries are flat names; anything path-like is rejected.
    fn entry_path(&self, name: &str) -> Result<PathBuf, AppError> {
        if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
            return Err(AppError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid workspace entry name: {:?}", name),
            )));
        }
        Ok(self.workspace.join(name))
    }
}

#[async_trait]
impl Engine for ProcessEngine {
    async fn write_file(&self, name: &str, bytes: &[u8]) -> Result<(), AppError> {
        let path = self.entry_path(name)?;
        tokio::fs::write(&path, bytes).await?;
        Ok(())
    }

    async fn read_file(&self, name: &str) -> Result<Vec<u8>, AppError> {
        let path = self.entry_path(name)?;
        Ok(tokio::fs::read(&path).await?)
    }

    async fn delete_file(&self, name: &str) -> Result<(), AppError> {
        let path = self.entry_path(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exec(&self, args: &[String], progress: Option<ProgressFn>) -> Result<(), AppError> {
        log::debug!(
            target: "vidpipe::engine::process",
            "Spawning engine job: {:?}",
            args
        );

        let mut child = Command::new(&self.runtime_path)
            .args(args)
            .current_dir(&self.workspace)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .map_err(|e| AppError::pipeline_failed(-1, format!("failed to spawn engine: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::pipeline_failed(-1, "failed to capture stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| AppError::pipeline_failed(-1, "failed to capture stderr"))?;

        // Duration arrives on stderr, positions on stdout; share it between
        // the two readers.
        let duration: Arc<Mutex<Option<f64>>> = Arc::new(Mutex::new(None));
        let stderr_tail: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));

        let stdout_task = {
            let duration = Arc::clone(&duration);
            let progress = progress.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                let mut last_emitted: Option<u8> = None;
                while let Ok(Some(line)) = lines.next_line().await {
                    let current = *duration.lock();
                    let (percent, new_duration) = parse_engine_progress(&line, current);
                    if new_duration != current {
                        *duration.lock() = new_duration;
                    }
                    if let Some(p) = percent
                        && last_emitted != Some(p)
                    {
                        last_emitted = Some(p);
                        if let Some(ref cb) = progress {
                            cb(p);
                        }
                    }
                }
            })
        };

        let stderr_task = {
            let duration = Arc::clone(&duration);
            let stderr_tail = Arc::clone(&stderr_tail);
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    log::trace!(target: "vidpipe::engine::process", "{}", line);
                    let current = *duration.lock();
                    let (_, new_duration) = parse_engine_progress(&line, current);
                    if new_duration != current {
                        *duration.lock() = new_duration;
                    }
                    let mut tail = stderr_tail.lock();
                    tail.extend_from_slice(line.as_bytes());
                    tail.push(b'\n');
                    if tail.len() > MAX_STDERR_BYTES {
                        let excess = tail.len() - MAX_STDERR_BYTES;
                        tail.drain(..excess);
                    }
                }
            })
        };

        let status = child
            .wait()
            .await
            .map_err(|e| AppError::pipeline_failed(-1, format!("waiting for engine: {}", e)))?;
        let _ = stdout_task.await;
        let _ = stderr_task.await;

        if status.success() {
            log::debug!(target: "vidpipe::engine::process", "Engine job completed");
            Ok(())
        } else {
            let code = status.code().unwrap_or(-1);
            let stderr_bytes = stderr_tail.lock().clone();
            let stderr_str = String::from_utf8_lossy(&stderr_bytes).to_string();
            log::error!(
                target: "vidpipe::engine::process",
                "Engine job failed (code={}): {}",
                code,
                stderr_str.lines().next_back().unwrap_or("")
            );
            Err(AppError::pipeline_failed(code, stderr_str))
        }
    }
}
