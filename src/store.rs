use crate::record::{AssetMetadata, ImageRecord};
use std::collections::HashMap;

/// Ordered, id-deduplicated collection of fetched records.
/// Insertion order is display order.
#[derive(Debug, Default)]
pub struct ResultStore {
    records: Vec<ImageRecord>,
    by_id: HashMap<String, usize>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record; returns false if its id is already present
    pub fn insert(&mut self, record: ImageRecord) -> bool {
        if self.by_id.contains_key(&record.id) {
            return false;
        }
        self.by_id.insert(record.id.clone(), self.records.len());
        self.records.push(record);
        true
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.by_id.clear();
    }

    pub fn get(&self, id: &str) -> Option<&ImageRecord> {
        self.by_id.get(id).and_then(|idx| self.records.get(*idx))
    }

    /// Apply measured metadata to the record with this id.
    /// Returns true if anything about the record changed.
    pub fn enrich(&mut self, id: &str, meta: &AssetMetadata) -> bool {
        match self.by_id.get(id) {
            Some(&idx) => self.records[idx].enrich(meta),
            None => false,
        }
    }

    pub fn records(&self) -> &[ImageRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
