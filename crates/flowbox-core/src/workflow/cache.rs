//! Result cache: the last successful output of each box and the inputs that
//! produced it.
//!
//! Backed by `DashMap` so the orchestrator's worker and request handlers can
//! read and write without an outer lock. Values are cloned on the way in and
//! on the way out; nothing handed to a caller aliases cached state.

use std::sync::Arc;

use dashmap::DashMap;
use flowbox_types::workflow::ValueMap;
use serde::{Deserialize, Serialize};

/// One cached execution: the output a box produced and the inputs it ran on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub output: ValueMap,
    pub inputs: ValueMap,
}

/// Per-box cache of the most recent successful execution.
///
/// Cloning shares the underlying map.
#[derive(Debug, Clone, Default)]
pub struct ResultCache {
    entries: Arc<DashMap<String, CacheEntry>>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful execution, replacing any previous entry.
    pub fn put(&self, box_id: &str, output: &ValueMap, inputs: &ValueMap) {
        self.entries.insert(
            box_id.to_string(),
            CacheEntry {
                output: output.clone(),
                inputs: inputs.clone(),
            },
        );
    }

    /// Copy of the last successful output, if any.
    pub fn get_output(&self, box_id: &str) -> Option<ValueMap> {
        self.entries.get(box_id).map(|e| e.output.clone())
    }

    /// Copy of the inputs that produced the last successful output, if any.
    pub fn get_inputs_used(&self, box_id: &str) -> Option<ValueMap> {
        self.entries.get(box_id).map(|e| e.inputs.clone())
    }

    pub fn get_entry(&self, box_id: &str) -> Option<CacheEntry> {
        self.entries.get(box_id).map(|e| e.value().clone())
    }

    /// Drop one box's entry. No-op if absent.
    pub fn clear_one(&self, box_id: &str) {
        self.entries.remove(box_id);
    }

    /// Drop every entry.
    pub fn clear_all(&self) {
        self.entries.clear();
    }

    /// Box ids with an entry, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
