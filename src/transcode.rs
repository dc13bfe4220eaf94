//! Transcode worker: one source file in, one web-deliverable blob out.
//!
//! The encode pipeline is fixed (no user-adjustable codec parameters):
//! H.264 fast preset at CRF 23, AAC audio at 128 kbps, container flagged for
//! progressive download. A source already in the target container is
//! re-encoded like any other; there is no passthrough shortcut.

use crate::blob::Blob;
use crate::engine::{Engine, EngineHandle, ProgressFn};
use crate::error::AppError;
use crate::record::SourceFile;

/// Workspace name for the source, keeping the original extension so the
/// engine's demuxer can sniff the container.
pub(crate) fn workspace_input_name(source: &SourceFile) -> String {
    format!("input.{}", source.extension().unwrap_or_else(|| "bin".into()))
}

pub(crate) fn build_transcode_args(input: &str, output: &str, target_format: &str) -> Vec<String> {
    [
        "-progress",
        "pipe:1",
        "-i",
        input,
        "-c:v",
        "libx264",
        "-preset",
        "fast",
        "-crf",
        "23",
        "-c:a",
        "aac",
        "-b:a",
        "128k",
        "-movflags",
        "+faststart",
        "-f",
        target_format,
        output,
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

/// Re-encode `source` into `target_format`. The source bytes are never
/// mutated; workspace entries are deleted on success and failure alike.
pub async fn transcode(
    handle: &EngineHandle,
    source: &SourceFile,
    target_format: &str,
    progress: Option<ProgressFn>,
) -> Result<Blob, AppError> {
    let engine = handle.ensure_ready().await?;
    let _job = handle.begin_job().await;

    let input_name = workspace_input_name(source);
    let output_name = format!("output.{}", target_format);
    log::debug!(
        target: "vidpipe::transcode",
        "Transcoding {} ({:.1} MB) -> {}",
        source.name,
        source.size_mb(),
        output_name
    );

    let result = run_encode(&*engine, source, &input_name, &output_name, target_format, progress).await;
    // Cleanup runs on success and failure alike and never masks the job result.
    for name in [input_name.as_str(), output_name.as_str()] {
        if let Err(e) = engine.delete_file(name).await {
            log::warn!(
                target: "vidpipe::transcode",
                "Workspace cleanup of {} failed: {}",
                name,
                e
            );
        }
    }

    let bytes = result.map_err(AppError::into_conversion)?;
    Ok(Blob::new(bytes, format!("video/{}", target_format)))
}

async fn run_encode(
    engine: &dyn Engine,
    source: &SourceFile,
    input_name: &str,
    output_name: &str,
    target_format: &str,
    progress: Option<ProgressFn>,
) -> Result<Vec<u8>, AppError> {
    engine.write_file(input_name, source.bytes()).await?;
    let args = build_transcode_args(input_name, output_name, target_format);
    engine.exec(&args, progress).await?;
    engine.read_file(output_name).await
}
