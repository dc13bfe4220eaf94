//! Per-submitted-file tracking record and its status state machine.

use std::sync::Arc;

use crate::blob::{Blob, BlobHandle};

pub type RecordId = String;

pub fn new_record_id() -> RecordId {
    uuid::Uuid::new_v4().to_string()
}

/// One submitted source file: immutable bytes plus declared metadata.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SourceFile {
    pub name: String,
    pub mime: String,
    pub size: u64,
    #[serde(skip)]
    bytes: Arc<[u8]>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        let bytes = bytes.into();
        let size = bytes.len() as u64;
        Self {
            name: name.into(),
            mime: mime.into(),
            size,
            bytes,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Lowercased extension of the original name, without the dot.
    pub fn extension(&self) -> Option<String> {
        let (_, ext) = self.name.rsplit_once('.')?;
        if ext.is_empty() {
            None
        } else {
            Some(ext.to_ascii_lowercase())
        }
    }

    /// Original name without its extension.
    pub fn stem(&self) -> &str {
        self.name
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.name)
    }

    pub fn as_blob(&self) -> Blob {
        Blob::new(Arc::clone(&self.bytes), self.mime.clone())
    }

    pub fn size_mb(&self) -> f64 {
        self.size as f64 / 1024.0 / 1024.0
    }
}

/// Record lifecycle. Transitions are monotonic: Uploading -> Processing ->
/// Ready | Error. Ready and Error are terminal; nothing ever goes back to
/// Uploading.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum RecordStatus {
    Uploading,
    Processing,
    Ready,
    Error { message: String },
}

impl RecordStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::Error { .. })
    }
}

/// Tracking unit for one submitted file. Owned and mutated only by the
/// orchestrator; observers get clones (blob bytes are shared, not copied).
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoRecord {
    pub id: RecordId,
    pub source: SourceFile,
    /// Displayable reference to the raw source. Allocated once at record
    /// creation, revoked once at removal.
    pub preview: BlobHandle,
    /// Present iff status == Ready.
    pub thumbnail: Option<BlobHandle>,
    /// Present iff status == Ready.
    #[serde(skip)]
    pub output: Option<Blob>,
    pub status: RecordStatus,
    /// Engine progress for the in-flight job, 0-100.
    pub progress: u8,
}

impl VideoRecord {
    pub fn new(source: SourceFile, preview: BlobHandle) -> Self {
        Self {
            id: new_record_id(),
            source,
            preview,
            thumbnail: None,
            output: None,
            status: RecordStatus::Uploading,
            progress: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(name: &str) -> SourceFile {
        SourceFile::new(name, "video/mp4", vec![0u8; 4])
    }

    #[test]
    fn extension_is_lowercased() {
        assert_eq!(source("Clip.MOV").extension().as_deref(), Some("mov"));
        assert_eq!(source("clip.3gp").extension().as_deref(), Some("3gp"));
        assert_eq!(source("noext").extension(), None);
    }

    #[test]
    fn stem_strips_only_the_last_extension() {
        assert_eq!(source("holiday.clip.mp4").stem(), "holiday.clip");
        assert_eq!(source("noext").stem(), "noext");
    }

    #[test]
    fn new_record_starts_uploading_without_artifacts() {
        let store = crate::blob::HandleStore::new();
        let src = source("a.mp4");
        let preview = store.allocate(src.as_blob());
        let record = VideoRecord::new(src, preview);
        assert_eq!(record.status, RecordStatus::Uploading);
        assert!(record.thumbnail.is_none());
        assert!(record.output.is_none());
        assert_eq!(record.progress, 0);
    }

    #[test]
    fn terminal_statuses() {
        assert!(RecordStatus::Ready.is_terminal());
        assert!(
            RecordStatus::Error {
                message: "x".into()
            }
            .is_terminal()
        );
        assert!(!RecordStatus::Uploading.is_terminal());
        assert!(!RecordStatus::Processing.is_terminal());
    }
}
