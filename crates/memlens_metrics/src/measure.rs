//! Open and finalized memory measures

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Extra data attached to a finalized measure.
pub type Params = BTreeMap<String, serde_json::Value>;

/// How finalized measures are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasureLayout {
    /// One entry per stop, in insertion order.
    #[default]
    Timeline,
    /// One entry per label; a repeated label replaces the earlier entry.
    ByLabel,
}

/// A measure that has been started but not stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenMeasure {
    pub label: String,
    pub start: u64,
    pub source: Option<String>,
    pub(crate) sequence: u64,
}

/// A closed interval between two memory readings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalizedMeasure {
    pub label: String,
    pub start: u64,
    /// `start` minus the request-start reading.
    pub relative_start: i64,
    pub end: u64,
    /// `end` minus the request-end reading, once that reading exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relative_end: Option<i64>,
    /// `end - start`; negative when memory was released.
    pub duration: i64,
    pub duration_str: String,
    #[serde(default)]
    pub params: Params,
    #[serde(default, rename = "collector", skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Signed difference `to - from` between two readings.
#[inline]
pub(crate) fn delta(from: u64, to: u64) -> i64 {
    to.wrapping_sub(from) as i64
}

/// Values a measured unit of work may hand back as extra parameters.
pub trait IntoParams {
    fn into_params(self) -> Option<Params>;
}

impl IntoParams for () {
    fn into_params(self) -> Option<Params> {
        None
    }
}

impl IntoParams for Params {
    fn into_params(self) -> Option<Params> {
        Some(self)
    }
}

impl IntoParams for Option<Params> {
    fn into_params(self) -> Option<Params> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_is_signed() {
        assert_eq!(delta(100, 250), 150);
        assert_eq!(delta(250, 100), -150);
    }

    #[test]
    fn layout_parses_snake_case() {
        let layout: MeasureLayout = serde_json::from_str("\"by_label\"").unwrap();
        assert_eq!(layout, MeasureLayout::ByLabel);
    }
}
