//! Memlens Metrics - memory measurement ledger
//!
//! Records named start/stop intervals of memory readings for one request and
//! summarizes them for a debugging toolbar.
//!
//! # Usage
//!
//! ```ignore
//! use memlens_metrics::MemoryLedger;
//!
//! let mut ledger = MemoryLedger::new();
//! ledger.start_measure("boot", Some("Bootstrap"), None);
//! // ... do work ...
//! ledger.stop_measure("boot", None)?;
//!
//! ledger.measure("render", None, |_| {
//!     // ... work measured even if it panics ...
//! });
//!
//! let snapshot = ledger.collect();
//! println!("{}", serde_json::to_string_pretty(&snapshot)?);
//! ```

mod error;
mod format;
mod guard;
mod ledger;
mod measure;
mod snapshot;
mod widget;

pub use error::LedgerError;
pub use format::{DataFormatter, FormatBytes};
pub use guard::MeasureGuard;
pub use ledger::MemoryLedger;
pub use measure::{FinalizedMeasure, IntoParams, MeasureLayout, OpenMeasure, Params};
pub use snapshot::{Measures, MemorySnapshot};
pub use widget::{WidgetDescriptor, Widgets, MEMORY_COLLECTOR_NAME};

pub use memlens_env::{MemoryMode, MemorySource};

// ============================================================================
// Macros
// ============================================================================

/// Measure a block against a ledger; the measure closes when the block ends.
#[macro_export]
macro_rules! memory_scope {
    ($ledger:expr, $label:expr, $body:block) => {{
        let _memory_scope = $ledger.scope($label, None);
        $body
    }};
}
