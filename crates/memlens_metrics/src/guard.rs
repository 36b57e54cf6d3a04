//! Scoped measures that close themselves

use crate::ledger::MemoryLedger;
use crate::measure::Params;
use std::ops::{Deref, DerefMut};

/// Open measure tied to a lexical scope.
///
/// Dropping the guard stops the measure, also while unwinding. The guard
/// derefs to the ledger so nested measures can be recorded through it.
pub struct MeasureGuard<'a> {
    ledger: &'a mut MemoryLedger,
    name: String,
    params: Option<Params>,
}

impl<'a> MeasureGuard<'a> {
    pub(crate) fn new(ledger: &'a mut MemoryLedger, name: String) -> Self {
        Self {
            ledger,
            name,
            params: None,
        }
    }

    /// Internal name the measure was opened under.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_params(&mut self, params: Params) {
        self.params = Some(params);
    }

    pub fn param(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.params
            .get_or_insert_with(Params::new)
            .insert(key.into(), value.into());
    }
}

impl Deref for MeasureGuard<'_> {
    type Target = MemoryLedger;

    fn deref(&self) -> &MemoryLedger {
        self.ledger
    }
}

impl DerefMut for MeasureGuard<'_> {
    fn deref_mut(&mut self) -> &mut MemoryLedger {
        self.ledger
    }
}

impl Drop for MeasureGuard<'_> {
    fn drop(&mut self) {
        let params = self.params.take();
        if self.ledger.try_stop_measure(&self.name, params).is_none() {
            tracing::debug!(name = %self.name, "scoped measure was already stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::ledger::MemoryLedger;
    use memlens_env::{MemoryMode, ScriptedMemory};

    #[test]
    fn drop_closes_measure_with_params() {
        let mut ledger = MemoryLedger::with_source(ScriptedMemory::new([0, 100, 164]), MemoryMode::Used);
        {
            let mut guard = ledger.scope("render", Some("view"));
            assert!(guard.has_started_measure(guard.name()));
            guard.param("template", "home");
        }

        assert_eq!(ledger.open_count(), 0);
        let measure = &ledger.measures()[0];
        assert_eq!(measure.label, "render");
        assert_eq!(measure.duration, 64);
        assert_eq!(measure.params["template"], "home");
    }

    #[test]
    fn scope_names_are_unique() {
        let mut ledger = MemoryLedger::with_source(ScriptedMemory::fixed(0), MemoryMode::Used);
        let first = ledger.scope("same", None).name().to_string();
        let second = ledger.scope("same", None).name().to_string();
        assert_ne!(first, second);
        assert_eq!(ledger.measures().len(), 2);
    }

    #[test]
    fn manual_stop_inside_scope_is_not_repeated() {
        let mut ledger = MemoryLedger::with_source(ScriptedMemory::fixed(0), MemoryMode::Used);
        {
            let mut guard = ledger.scope("early", None);
            let name = guard.name().to_string();
            guard.stop_measure(&name, None).unwrap();
        }
        assert_eq!(ledger.measures().len(), 1);
    }
}
