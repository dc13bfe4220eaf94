//! Insertion-ordered record store. Written only by the pipeline orchestrator;
//! observers read cloned snapshots through `Pipeline`.

use std::collections::HashMap;

use crate::record::{RecordId, VideoRecord};

#[derive(Debug, Default)]
pub struct RecordStore {
    records: HashMap<RecordId, VideoRecord>,
    order: Vec<RecordId>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: VideoRecord) {
        self.order.push(record.id.clone());
        self.records.insert(record.id.clone(), record);
    }

    pub fn get(&self, id: &str) -> Option<&VideoRecord> {
        self.records.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut VideoRecord> {
        self.records.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<VideoRecord> {
        let removed = self.records.remove(id);
        if removed.is_some() {
            self.order.retain(|r| r != id);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in submission order.
    pub fn iter_ordered(&self) -> impl Iterator<Item = &VideoRecord> {
        self.order.iter().filter_map(|id| self.records.get(id))
    }
}
