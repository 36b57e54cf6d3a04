//! Deterministic memory source for tests and demos

use crate::memory::{MemoryMode, MemorySource};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

/// Replays a fixed sequence of readings, one per `current` call.
///
/// Once the script runs out the last reading repeats. The mode is ignored.
/// `peak` reports the highest reading handed out, unless overridden.
#[derive(Debug, Default)]
pub struct ScriptedMemory {
    readings: RefCell<VecDeque<u64>>,
    last: Cell<u64>,
    highest: Cell<u64>,
    peak_override: Option<u64>,
}

impl ScriptedMemory {
    pub fn new(readings: impl IntoIterator<Item = u64>) -> Self {
        Self {
            readings: RefCell::new(readings.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Always reads `value`.
    pub fn fixed(value: u64) -> Self {
        let source = Self::default();
        source.last.set(value);
        source.highest.set(value);
        source
    }

    pub fn with_peak(mut self, peak: u64) -> Self {
        self.peak_override = Some(peak);
        self
    }

    /// Appends readings to the end of the script.
    pub fn push(&self, readings: impl IntoIterator<Item = u64>) {
        self.readings.borrow_mut().extend(readings);
    }

    pub fn remaining(&self) -> usize {
        self.readings.borrow().len()
    }
}

impl MemorySource for ScriptedMemory {
    fn current(&self, _mode: MemoryMode) -> u64 {
        if let Some(next) = self.readings.borrow_mut().pop_front() {
            self.last.set(next);
            self.highest.set(self.highest.get().max(next));
        }
        self.last.get()
    }

    fn peak(&self, _mode: MemoryMode) -> u64 {
        self.peak_override.unwrap_or_else(|| self.highest.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replays_then_repeats_last() {
        let source = ScriptedMemory::new([10, 30, 20]);
        assert_eq!(source.current(MemoryMode::Used), 10);
        assert_eq!(source.current(MemoryMode::Allocated), 30);
        assert_eq!(source.current(MemoryMode::Used), 20);
        assert_eq!(source.current(MemoryMode::Used), 20);
        assert_eq!(source.peak(MemoryMode::Used), 30);
        assert_eq!(source.remaining(), 0);
    }

    #[test]
    fn peak_override_wins() {
        let source = ScriptedMemory::fixed(5).with_peak(99);
        assert_eq!(source.current(MemoryMode::Used), 5);
        assert_eq!(source.peak(MemoryMode::Used), 99);
    }
}
