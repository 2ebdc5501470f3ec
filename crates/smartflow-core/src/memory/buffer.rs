//! Run-scoped memory buffer.
//!
//! Maps substep ids (and the reserved `input_data` key) to the output payload
//! of that substep. Every completed substep's output is visible to every
//! subsequent substep in the same run. Keys are kept in sorted order so the
//! iteration order is stable across runs and reloads.

use std::collections::BTreeMap;

use serde_json::Value;
use smartflow_types::state::StateSnapshot;

/// Reserved key holding the run's original `input_data`.
pub const INPUT_DATA_KEY: &str = "input_data";

/// Accumulating key-value store owned by a single workflow run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryBuffer {
    entries: BTreeMap<String, Value>,
}

impl MemoryBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a buffer from a persisted snapshot.
    pub fn from_snapshot(snapshot: StateSnapshot) -> Self {
        Self { entries: snapshot }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Store a substep's output under its id.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.entries.insert(key.into(), value);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    /// The run's original input text, if seeded.
    pub fn input_data(&self) -> Option<&Value> {
        self.entries.get(INPUT_DATA_KEY)
    }

    /// Record the run input under [`INPUT_DATA_KEY`].
    pub fn seed_input(&mut self, input_data: Value) {
        self.entries.insert(INPUT_DATA_KEY.to_string(), input_data);
    }

    /// Copy of the contents, suitable for persisting.
    pub fn snapshot(&self) -> StateSnapshot {
        self.entries.clone()
    }

    pub fn into_snapshot(self) -> StateSnapshot {
        self.entries
    }
}
