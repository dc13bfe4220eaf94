//! Accepted input containers and the advisory size ceiling.

use crate::error::AppError;
use crate::record::SourceFile;

/// Size guidance surfaced to users. Oversized files are logged and still
/// processed; the limit is not enforced inside the workers.
pub const ADVISORY_MAX_BYTES: u64 = 100 * 1024 * 1024;

/// One accepted input container: declared MIME plus its file extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcceptedFormat {
    pub container: &'static str,
    pub mime: &'static str,
    pub extensions: &'static [&'static str],
}

pub const ACCEPTED_FORMATS: &[AcceptedFormat] = &[
    AcceptedFormat {
        container: "mp4",
        mime: "video/mp4",
        extensions: &["mp4"],
    },
    AcceptedFormat {
        container: "3gp",
        mime: "video/3gpp",
        extensions: &["3gp", "3gpp"],
    },
    AcceptedFormat {
        container: "mov",
        mime: "video/quicktime",
        extensions: &["mov"],
    },
    AcceptedFormat {
        container: "avi",
        mime: "video/x-msvideo",
        extensions: &["avi"],
    },
    AcceptedFormat {
        container: "webm",
        mime: "video/webm",
        extensions: &["webm"],
    },
];

/// Match a source against the accepted set by declared MIME, falling back to
/// the file extension. Unsupported sources get a record anyway and fail at
/// the processing step; this is the gate that fails them.
pub fn validate_source(source: &SourceFile) -> Result<&'static AcceptedFormat, AppError> {
    let mime = source.mime.to_ascii_lowercase();
    if let Some(format) = ACCEPTED_FORMATS.iter().find(|f| f.mime == mime) {
        return Ok(format);
    }
    if let Some(ext) = source.extension()
        && let Some(format) = ACCEPTED_FORMATS
            .iter()
            .find(|f| f.extensions.contains(&ext.as_str()))
    {
        return Ok(format);
    }
    Err(AppError::UnsupportedFormat(format!(
        "{} ({})",
        source.name, source.mime
    )))
}

/// Advisory only: warn when a file exceeds the documented ceiling.
pub fn warn_if_oversized(source: &SourceFile) -> bool {
    if source.size > ADVISORY_MAX_BYTES {
        log::warn!(
            target: "vidpipe::validate",
            "{} is {:.1} MB, above the advisory {} MB limit; processing anyway",
            source.name,
            source.size_mb(),
            ADVISORY_MAX_BYTES / 1024 / 1024
        );
        true
    } else {
        false
    }
}
