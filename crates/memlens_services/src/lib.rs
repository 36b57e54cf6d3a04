//! Memlens Services Layer
//!
//! Host-side glue: settings, the shared ledger handle, the toolbar collector
//! seam and the start/stop helpers.

pub mod handle;
pub mod helpers;
pub mod settings;
pub mod toolbar;

pub use handle::{HandleScope, LedgerHandle};
pub use helpers::{CollectingSink, ErrorSink, MemoryHelpers, TracingSink};
pub use settings::{ErrorPolicy, MemorySettings, Settings, SettingsError};
pub use toolbar::{register_memory_collector, DataCollector, Toolbar, ToolbarError};

/// A toolbar with the memory collector wired in, if enabled.
pub struct Services {
    pub toolbar: Toolbar,
    pub memory: Option<MemoryHelpers>,
}

/// Service initialization
pub fn init_services(settings: &Settings) -> Result<Services, ToolbarError> {
    let mut toolbar = Toolbar::new();
    let memory = register_memory_collector(&mut toolbar, settings)?
        .map(|handle| MemoryHelpers::new(handle, settings.error_policy));
    tracing::info!(memory = memory.is_some(), "services initialized");
    Ok(Services { toolbar, memory })
}
