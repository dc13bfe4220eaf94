//! App error type for the ingestion pipeline. Implements Display and Serialize for presentation layers.

/// Last stderr lines kept when summarizing an engine failure for a record.
const SUMMARY_STDERR_LINES: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("Engine load failed: {0}")]
    EngineLoad(String),

    #[error("Engine pipeline failed (code {code}): {stderr}")]
    PipelineFailed { code: i32, stderr: String },

    #[error("Conversion failed (code {code}): {stderr}")]
    Conversion { code: i32, stderr: String },

    #[error("Thumbnail extraction failed (code {code}): {stderr}")]
    Thumbnail { code: i32, stderr: String },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Unknown record: {0}")]
    UnknownRecord(String),

    #[error("Record has no output artifact: {0}")]
    NotReady(String),
}

impl AppError {
    pub fn engine_load(message: impl Into<String>) -> Self {
        Self::EngineLoad(message.into())
    }

    pub fn pipeline_failed(code: i32, stderr: impl Into<String>) -> Self {
        Self::PipelineFailed {
            code,
            stderr: stderr.into(),
        }
    }

    /// Re-tag a raw engine pipeline failure as a conversion failure.
    /// Other variants pass through unchanged.
    pub fn into_conversion(self) -> Self {
        match self {
            Self::PipelineFailed { code, stderr } => Self::Conversion { code, stderr },
            other => other,
        }
    }

    /// Re-tag a raw engine pipeline failure as a thumbnail failure.
    pub fn into_thumbnail(self) -> Self {
        match self {
            Self::PipelineFailed { code, stderr } => Self::Thumbnail { code, stderr },
            other => other,
        }
    }

    /// Short, single-line cause for record-level Error status. Engine stderr
    /// is trimmed to its last few lines; everything else uses Display.
    pub fn summary(&self) -> String {
        match self {
            Self::PipelineFailed { code, stderr }
            | Self::Conversion { code, stderr }
            | Self::Thumbnail { code, stderr } => {
                let mut tail: Vec<&str> = stderr
                    .lines()
                    .rev()
                    .filter(|l| !l.trim().is_empty())
                    .take(SUMMARY_STDERR_LINES)
                    .collect();
                tail.reverse();
                let tail = tail.join("; ");
                let kind = match self {
                    Self::Thumbnail { .. } => "Thumbnail extraction failed",
                    Self::Conversion { .. } => "Conversion failed",
                    _ => "Engine pipeline failed",
                };
                if tail.is_empty() {
                    format!("{} (code {})", kind, code)
                } else {
                    format!("{} (code {}): {}", kind, code, tail)
                }
            }
            other => other.to_string(),
        }
    }
}

impl serde::Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.summary())
    }
}
