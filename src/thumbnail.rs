//! Thumbnail extractor: one still frame as a JPEG at a given time offset.

use crate::blob::Blob;
use crate::engine::{Engine, EngineHandle, ProgressFn};
use crate::error::AppError;
use crate::record::SourceFile;
use crate::transcode::workspace_input_name;

pub const DEFAULT_THUMBNAIL_OFFSET_SECS: f64 = 1.0;

const THUMBNAIL_NAME: &str = "thumbnail.jpg";

pub(crate) fn build_thumbnail_args(input: &str, offset_secs: f64) -> Vec<String> {
    vec![
        "-i".into(),
        input.into(),
        "-ss".into(),
        format!("{}", offset_secs),
        "-vframes".into(),
        "1".into(),
        "-q:v".into(),
        "2".into(),
        THUMBNAIL_NAME.into(),
    ]
}

/// Extract a single frame at `offset_secs` as a JPEG blob. An offset beyond
/// the clip's duration is an engine-reported failure, not validated here.
pub async fn extract_thumbnail(
    handle: &EngineHandle,
    source: &SourceFile,
    offset_secs: f64,
    progress: Option<ProgressFn>,
) -> Result<Blob, AppError> {
    let engine = handle.ensure_ready().await?;
    let _job = handle.begin_job().await;

    let input_name = workspace_input_name(source);
    log::debug!(
        target: "vidpipe::thumbnail",
        "Extracting thumbnail from {} at {}s",
        source.name,
        offset_secs
    );

    let result = run_extract(&*engine, source, &input_name, offset_secs, progress).await;
    for name in [input_name.as_str(), THUMBNAIL_NAME] {
        if let Err(e) = engine.delete_file(name).await {
            log::warn!(
                target: "vidpipe::thumbnail",
                "Workspace cleanup of {} failed: {}",
                name,
                e
            );
        }
    }

    let bytes = result.map_err(AppError::into_thumbnail)?;
    Ok(Blob::new(bytes, "image/jpeg"))
}

async fn run_extract(
    engine: &dyn Engine,
    source: &SourceFile,
    input_name: &str,
    offset_secs: f64,
    progress: Option<ProgressFn>,
) -> Result<Vec<u8>, AppError> {
    engine.write_file(input_name, source.bytes()).await?;
    let args = build_thumbnail_args(input_name, offset_secs);
    engine.exec(&args, progress).await?;
    engine.read_file(THUMBNAIL_NAME).await
}
