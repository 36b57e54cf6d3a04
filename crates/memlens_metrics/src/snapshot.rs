//! Collected ledger summary

use crate::measure::{FinalizedMeasure, MeasureLayout};
use serde::{Serialize, Serializer};

/// Finalized measures as handed to the host.
///
/// Serializes as a list for [`MeasureLayout::Timeline`] and as a
/// `label -> duration_str` map for [`MeasureLayout::ByLabel`].
#[derive(Debug, Clone, PartialEq)]
pub struct Measures {
    layout: MeasureLayout,
    entries: Vec<FinalizedMeasure>,
}

impl Measures {
    pub(crate) fn new(layout: MeasureLayout, entries: Vec<FinalizedMeasure>) -> Self {
        Self { layout, entries }
    }

    pub fn layout(&self) -> MeasureLayout {
        self.layout
    }

    /// First measure carrying `label`.
    pub fn get(&self, label: &str) -> Option<&FinalizedMeasure> {
        self.entries.iter().find(|m| m.label == label)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.get(label).is_some()
    }

    pub fn as_slice(&self) -> &[FinalizedMeasure] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &FinalizedMeasure> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for Measures {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.layout {
            MeasureLayout::Timeline => serializer.collect_seq(&self.entries),
            MeasureLayout::ByLabel => serializer.collect_map(
                self.entries
                    .iter()
                    .map(|m| (m.label.as_str(), m.duration_str.as_str())),
            ),
        }
    }
}

/// Immutable result of [`crate::MemoryLedger::collect`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemorySnapshot {
    pub start: u64,
    pub end: u64,
    pub duration: i64,
    pub duration_str: String,
    pub peak_usage: u64,
    pub peak_usage_str: String,
    pub measures: Measures,
}
