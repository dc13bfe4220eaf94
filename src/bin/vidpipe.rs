//! CLI front end: submit video files, wait for the batch to drain, save the
//! web-optimized outputs next to a chosen directory.
//!
//! Usage: vidpipe [--out DIR] [--json] FILE...

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use vidpipe::record::SourceFile;
use vidpipe::validate::ACCEPTED_FORMATS;
use vidpipe::{Pipeline, PipelineConfig, RecordStatus};

struct CliArgs {
    out_dir: PathBuf,
    json: bool,
    inputs: Vec<PathBuf>,
}

fn parse_args() -> Result<CliArgs, String> {
    let mut out_dir = PathBuf::from(".");
    let mut json = false;
    let mut inputs = Vec::new();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--out" => {
                out_dir = args
                    .next()
                    .map(PathBuf::from)
                    .ok_or_else(|| "--out requires a directory".to_string())?;
            }
            "--json" => json = true,
            "--help" | "-h" => {
                return Err(format!(
                    "usage: vidpipe [--out DIR] [--json] FILE...\n\naccepted containers: {}",
                    ACCEPTED_FORMATS
                        .iter()
                        .map(|f| f.container)
                        .collect::<Vec<_>>()
                        .join(", ")
                ));
            }
            other => inputs.push(PathBuf::from(other)),
        }
    }
    if inputs.is_empty() {
        return Err("usage: vidpipe [--out DIR] [--json] FILE...".to_string());
    }
    Ok(CliArgs {
        out_dir,
        json,
        inputs,
    })
}

/// Declared MIME from the file extension; unknown extensions get a generic
/// type and are rejected by the pipeline's validation gate.
fn mime_for(path: &Path) -> String {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    ACCEPTED_FORMATS
        .iter()
        .find(|f| f.extensions.contains(&ext.as_str()))
        .map(|f| f.mime.to_string())
        .unwrap_or_else(|| "application/octet-stream".to_string())
}

fn read_sources(paths: &[PathBuf]) -> std::io::Result<Vec<SourceFile>> {
    let mut sources = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        let mime = mime_for(path);
        sources.push(SourceFile::new(name, mime, bytes));
    }
    Ok(sources)
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{}", message);
            return ExitCode::FAILURE;
        }
    };

    let sources = match read_sources(&args.inputs) {
        Ok(sources) => sources,
        Err(e) => {
            eprintln!("failed to read inputs: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let pipeline = Pipeline::new(PipelineConfig::default());
    let ids = pipeline.submit_batch(sources);
    pipeline.wait_idle().await;

    let mut failures = 0usize;
    for id in &ids {
        let Some(record) = pipeline.record(id) else {
            continue;
        };
        match &record.status {
            RecordStatus::Ready => match pipeline.save_artifact(id, &args.out_dir) {
                Ok(path) => println!("{} -> {}", record.source.name, path.display()),
                Err(e) => {
                    eprintln!("{}: saving output failed: {}", record.source.name, e);
                    failures += 1;
                }
            },
            RecordStatus::Error { message } => {
                eprintln!("{}: {}", record.source.name, message);
                failures += 1;
            }
            other => {
                // Unreachable once wait_idle returns; report it rather than hang.
                eprintln!("{}: unexpected status {:?}", record.source.name, other);
                failures += 1;
            }
        }
    }

    if args.json {
        match serde_json::to_string_pretty(&pipeline.records()) {
            Ok(report) => println!("{}", report),
            Err(e) => {
                eprintln!("failed to serialize report: {}", e);
                failures += 1;
            }
        }
    }

    if failures == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
