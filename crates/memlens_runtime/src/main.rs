//! Memlens Runtime
//!
//! Boots the toolbar with the memory collector, records a few measures and
//! prints what the host would receive.

use anyhow::{Context, Result};
use memlens_env::CountingAllocator;
use memlens_metrics::{memory_scope, Params};
use memlens_services::Settings;

#[global_allocator]
static GLOBAL: CountingAllocator = CountingAllocator;

fn load_settings() -> Result<Settings> {
    let mut settings = match std::env::args().nth(1) {
        Some(path) => Settings::load(&path).with_context(|| format!("loading settings from {path}"))?,
        None => Settings::default(),
    };
    settings.apply_env().context("applying MEMLENS_* overrides")?;
    Ok(settings)
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let settings = load_settings()?;
    tracing::info!(?settings, "Memlens v{}", env!("CARGO_PKG_VERSION"));

    let mut services = memlens_services::init_services(&settings)?;
    let Some(memory) = services.memory.as_ref() else {
        tracing::info!("Memory collector disabled; nothing to record");
        return Ok(());
    };

    memory.start_memory_measure("boot", Some("Bootstrap"))?;
    let config: Vec<String> = (0..2_000).map(|i| format!("key-{i}")).collect();
    memory.stop_memory_measure("boot")?;

    memory.handle().measure("buffers", Some("demo"), || {
        let buffers: Vec<Vec<u8>> = (0..16).map(|_| vec![0u8; 64 * 1024]).collect();
        let mut params = Params::new();
        params.insert("buffers".to_string(), buffers.len().into());
        params
    });

    memory.handle().with_mut(|ledger| {
        let table = memory_scope!(ledger, "lookup table", {
            (0..10_000u32).map(|i| i.wrapping_mul(2_654_435_761)).collect::<Vec<_>>()
        });
        tracing::debug!(entries = table.len(), "lookup table built");
    });

    // Left open on purpose: collection closes it.
    memory.start_memory_measure("response", Some("Response"))?;
    if let Err(err) = memory.stop_memory_measure("never-started") {
        tracing::warn!(error = %err, "stop propagated to caller");
    }

    let data = services.toolbar.collect_all();
    let widgets = services.toolbar.widgets();
    println!("{}", serde_json::to_string_pretty(&data)?);
    println!("{}", serde_json::to_string_pretty(&widgets)?);

    tracing::info!(config_entries = config.len(), "Runtime finished");
    Ok(())
}
