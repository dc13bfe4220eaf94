//! Byte blobs and the handle registry backing preview/thumbnail references.
//!
//! A `BlobHandle` is the session-local equivalent of an object URL: allocated
//! when a record acquires a displayable artifact, revoked exactly once when
//! the record is discarded. Revoking an already-revoked handle is a no-op so
//! removal paths never double-release.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// Immutable bytes tagged with a MIME type. Cloning shares the buffer.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Blob {
    #[serde(skip)]
    bytes: Arc<[u8]>,
    pub mime: String,
    pub size: u64,
}

impl Blob {
    pub fn new(bytes: impl Into<Arc<[u8]>>, mime: impl Into<String>) -> Self {
        let bytes = bytes.into();
        let size = bytes.len() as u64;
        Self {
            bytes,
            mime: mime.into(),
            size,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }
}

/// Opaque reference into a `HandleStore`. Cheap to copy; resolving after
/// revocation returns None.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(transparent)]
pub struct BlobHandle(u64);

/// Registry of live blob handles.
#[derive(Debug, Default)]
pub struct HandleStore {
    entries: Mutex<HashMap<u64, Blob>>,
    next_id: AtomicU64,
}

impl HandleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&self, blob: Blob) -> BlobHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.lock().insert(id, blob);
        BlobHandle(id)
    }

    pub fn resolve(&self, handle: BlobHandle) -> Option<Blob> {
        self.entries.lock().get(&handle.0).cloned()
    }

    /// Release a handle. Returns true if the handle was live; revoking twice
    /// returns false and does nothing.
    pub fn revoke(&self, handle: BlobHandle) -> bool {
        self.entries.lock().remove(&handle.0).is_some()
    }

    pub fn live_count(&self) -> usize {
        self.entries.lock().len()
    }
}
