use std::collections::HashMap;
use std::sync::Arc;

use super::graphic::Batch;
use crate::error::RenderError;
use crate::scene::{Feature, FeatureTable};

#[derive(Debug, Clone)]
struct BatchEntry {
    uid: u64,
    batch_id: u32,
    features: Arc<FeatureTable>,
}

impl BatchEntry {
    fn id_count(&self) -> u32 {
        (self.features.len() as u32).max(1)
    }
}

/// Result of resolving a feature id back to its batch.
#[derive(Debug, Clone)]
pub struct FeatureLookup<'a> {
    /// First id of the owning batch
    pub batch_id: u32,
    pub local_index: usize,
    pub features: &'a Arc<FeatureTable>,
}

impl FeatureLookup<'_> {
    /// The feature itself; `None` for a batch with an empty feature table.
    pub fn feature(&self) -> Option<&Feature> {
        self.features.get(self.local_index)
    }
}

/// Assigns each batch drawn in a frame a contiguous range of feature ids.
///
/// Id 0 means "no batch". The first batch starts at 1 and each following one
/// starts after the previous batch's range, which is its feature count or 1
/// for an empty table. Ranges never overlap, so [`find`](Self::find) is a
/// binary search.
#[derive(Debug, Clone)]
pub struct BatchState {
    entries: Vec<BatchEntry>,
    index_by_uid: HashMap<u64, usize>,
    current: Option<usize>,
    next_id: u32,
}

impl Default for BatchState {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchState {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            index_by_uid: HashMap::new(),
            current: None,
            next_id: 1,
        }
    }

    /// Makes `batch` the active batch and returns its first feature id.
    ///
    /// A batch seen before in this frame keeps its id. Unseen batches are
    /// only assigned an id when `allow_add` is true; otherwise 0 is returned.
    pub fn push(&mut self, batch: &Batch, allow_add: bool) -> Result<u32, RenderError> {
        if self.current.is_some() {
            log::warn!("Nested batch {} ignored", batch.uid());
            return Err(RenderError::NestedBatch);
        }

        let index = match self.index_by_uid.get(&batch.uid()) {
            Some(index) => *index,
            None if allow_add => self.add(batch),
            None => return Ok(0),
        };

        self.current = Some(index);
        Ok(self.entries[index].batch_id)
    }

    fn add(&mut self, batch: &Batch) -> usize {
        let entry = BatchEntry {
            uid: batch.uid(),
            batch_id: self.next_id,
            features: batch.features.clone(),
        };
        self.next_id = self.next_id.saturating_add(entry.id_count());

        let index = self.entries.len();
        self.index_by_uid.insert(entry.uid, index);
        self.entries.push(entry);
        index
    }

    pub fn pop(&mut self) {
        self.current = None;
    }

    /// First feature id of the active batch, or 0.
    pub fn current_batch_id(&self) -> u32 {
        self.current.map_or(0, |index| self.entries[index].batch_id)
    }

    pub fn is_active(&self) -> bool {
        self.current.is_some()
    }

    /// First feature id assigned to a batch, if it was drawn.
    pub fn batch_id(&self, batch: &Batch) -> Option<u32> {
        self.index_by_uid.get(&batch.uid()).map(|index| self.entries[*index].batch_id)
    }

    /// Resolves a feature id to its batch and local feature index.
    pub fn find(&self, feature_id: u32) -> Option<FeatureLookup<'_>> {
        if feature_id == 0 {
            return None;
        }

        let index = self.entries.partition_point(|e| e.batch_id <= feature_id);
        let entry = self.entries.get(index.checked_sub(1)?)?;
        let local = feature_id - entry.batch_id;
        if local >= entry.id_count() {
            return None;
        }

        Some(FeatureLookup {
            batch_id: entry.batch_id,
            local_index: local as usize,
            features: &entry.features,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}
