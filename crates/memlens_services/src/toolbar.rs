//! Host toolbar seam
//!
//! The toolbar owns collectors, asks each for its data at the end of a
//! request and merges their widget descriptions. Rendering is up to the host.

use crate::handle::LedgerHandle;
use crate::settings::Settings;
use memlens_metrics::{Widgets, MEMORY_COLLECTOR_NAME};
use serde_json::{Map, Value};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur while registering a collector with the toolbar.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ToolbarError {
    #[error("collector '{name}' is already registered")]
    DuplicateCollector { name: String },
}

/// A source of data for the toolbar.
pub trait DataCollector {
    fn name(&self) -> &str;
    fn collect(&mut self) -> Value;
    fn widgets(&self) -> Widgets {
        Widgets::new()
    }
}

impl DataCollector for LedgerHandle {
    fn name(&self) -> &str {
        MEMORY_COLLECTOR_NAME
    }

    fn collect(&mut self) -> Value {
        let snapshot = LedgerHandle::collect(self);
        match serde_json::to_value(&snapshot) {
            Ok(value) => value,
            Err(err) => {
                tracing::error!(error = %err, "failed to serialize memory snapshot");
                Value::Null
            }
        }
    }

    fn widgets(&self) -> Widgets {
        self.with(|ledger| ledger.widgets())
    }
}

#[derive(Default)]
pub struct Toolbar {
    collectors: Vec<Box<dyn DataCollector>>,
    switches: HashMap<String, bool>,
}

impl Toolbar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forces a collector on or off regardless of its own default.
    pub fn set_collect(&mut self, name: &str, enabled: bool) {
        self.switches.insert(name.to_string(), enabled);
    }

    pub fn should_collect(&self, name: &str, default: bool) -> bool {
        self.switches.get(name).copied().unwrap_or(default)
    }

    pub fn add_collector(&mut self, collector: Box<dyn DataCollector>) -> Result<(), ToolbarError> {
        let name = collector.name().to_string();
        if self.has_collector(&name) {
            return Err(ToolbarError::DuplicateCollector { name });
        }
        tracing::debug!(name = %name, "collector registered");
        self.collectors.push(collector);
        Ok(())
    }

    pub fn has_collector(&self, name: &str) -> bool {
        self.collectors.iter().any(|c| c.name() == name)
    }

    pub fn collector_names(&self) -> impl Iterator<Item = &str> {
        self.collectors.iter().map(|c| c.name())
    }

    /// Data from every collector, keyed by collector name.
    pub fn collect_all(&mut self) -> Value {
        let mut data = Map::new();
        for collector in &mut self.collectors {
            let value = collector.collect();
            data.insert(collector.name().to_string(), value);
        }
        Value::Object(data)
    }

    pub fn widgets(&self) -> Widgets {
        let mut widgets = Widgets::new();
        for collector in &self.collectors {
            widgets.extend(collector.widgets());
        }
        widgets
    }
}

/// Installs a memory ledger when the toolbar and settings allow it.
///
/// A toolbar switch for `memory_details` overrides `settings.memory.enabled`.
pub fn register_memory_collector(
    toolbar: &mut Toolbar,
    settings: &Settings,
) -> Result<Option<LedgerHandle>, ToolbarError> {
    if !toolbar.should_collect(MEMORY_COLLECTOR_NAME, settings.memory.enabled) {
        tracing::debug!("memory collector disabled");
        return Ok(None);
    }
    let handle = LedgerHandle::new(settings.build_ledger());
    toolbar.add_collector(Box::new(handle.clone()))?;
    Ok(Some(handle))
}
