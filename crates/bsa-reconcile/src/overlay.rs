//! Provisional overlay
//!
//! Speculative writes from provisional proposals live here, outside the
//! version store. Committed snapshots stay authoritative; the overlay is
//! merged over the head to form the advisory working view. A committed
//! write landing on an overlaid key evicts the entry — superseded, not a
//! conflict.

use std::collections::{BTreeMap, HashSet};

use serde_json::Value;

use bsa_core::StateData;

/// Speculative key-level writes, keyed by state key
#[derive(Debug, Default)]
pub struct ProvisionalOverlay {
    entries: BTreeMap<String, OverlayEntry>,
}

#[derive(Clone, Debug)]
struct OverlayEntry {
    /// `None` is a tombstone (provisional unset)
    value: Option<Value>,
    intent_id: String,
}

impl ProvisionalOverlay {
    pub fn new() -> Self {
        ProvisionalOverlay::default()
    }

    /// Merge the overlay over a base document
    pub fn apply_onto(&self, base: &StateData) -> StateData {
        let mut data = base.clone();
        for (key, entry) in &self.entries {
            match &entry.value {
                Some(value) => {
                    data.insert(key.clone(), value.clone());
                }
                None => {
                    data.remove(key);
                }
            }
        }
        data
    }

    /// Record the effect of one provisional apply as a before/after diff
    pub fn record(&mut self, intent_id: &str, before: &StateData, after: &StateData) {
        for (key, value) in after {
            if before.get(key) != Some(value) {
                self.entries.insert(
                    key.clone(),
                    OverlayEntry {
                        value: Some(value.clone()),
                        intent_id: intent_id.to_string(),
                    },
                );
            }
        }
        for key in before.keys() {
            if !after.contains_key(key) {
                self.entries.insert(
                    key.clone(),
                    OverlayEntry {
                        value: None,
                        intent_id: intent_id.to_string(),
                    },
                );
            }
        }
    }

    /// Drop entries whose keys a committed write touched
    ///
    /// Returns the intent ids that lost at least one entry, in key order.
    pub fn evict_touched(&mut self, touched: &HashSet<String>) -> Vec<String> {
        let mut evicted: Vec<String> = Vec::new();
        self.entries.retain(|key, entry| {
            if touched.contains(key) {
                if !evicted.contains(&entry.intent_id) {
                    evicted.push(entry.intent_id.clone());
                }
                false
            } else {
                true
            }
        });
        evicted
    }

    /// Keys currently overlaid
    pub fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
