//! Memory measurement ledger
//!
//! Tracks named open measures for one request, closes them into
//! [`FinalizedMeasure`]s and summarizes everything on [`MemoryLedger::collect`].

use crate::error::LedgerError;
use crate::format::{DataFormatter, FormatBytes};
use crate::guard::MeasureGuard;
use crate::measure::{delta, FinalizedMeasure, IntoParams, MeasureLayout, OpenMeasure, Params};
use crate::snapshot::{MemorySnapshot, Measures};
use crate::widget::{memory_widgets, Widgets, MEMORY_COLLECTOR_NAME};
use memlens_env::{MemoryMode, MemorySource, ProcessMemory};
use std::collections::HashMap;

pub struct MemoryLedger {
    source: Box<dyn MemorySource>,
    formatter: Box<dyn FormatBytes>,
    mode: MemoryMode,
    layout: MeasureLayout,
    request_start: u64,
    request_end: Option<u64>,
    peak_usage: u64,
    started: HashMap<String, OpenMeasure>,
    measures: Vec<FinalizedMeasure>,
    sequence: u64,
}

impl MemoryLedger {
    pub const NAME: &'static str = MEMORY_COLLECTOR_NAME;

    /// Ledger reading this process in the default mode.
    pub fn new() -> Self {
        Self::with_source(ProcessMemory, MemoryMode::default())
    }

    /// Ledger reading from `source`. The request-start reading is taken now.
    pub fn with_source(source: impl MemorySource + 'static, mode: MemoryMode) -> Self {
        let request_start = source.current(mode);
        Self {
            source: Box::new(source),
            formatter: Box::new(DataFormatter::default()),
            mode,
            layout: MeasureLayout::default(),
            request_start,
            request_end: None,
            peak_usage: 0,
            started: HashMap::new(),
            measures: Vec::new(),
            sequence: 0,
        }
    }

    pub fn with_formatter(mut self, formatter: impl FormatBytes + 'static) -> Self {
        self.formatter = Box::new(formatter);
        self
    }

    pub fn with_layout(mut self, layout: MeasureLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn name(&self) -> &'static str {
        Self::NAME
    }

    pub fn layout(&self) -> MeasureLayout {
        self.layout
    }

    pub fn mode(&self) -> MemoryMode {
        self.mode
    }

    /// Whether readings report allocated pages rather than used bytes.
    pub fn real_usage(&self) -> bool {
        self.mode.is_real_usage()
    }

    pub fn set_real_usage(&mut self, real_usage: bool) {
        self.mode = MemoryMode::from_real_usage(real_usage);
    }

    fn read(&self) -> u64 {
        let reading = self.source.current(self.mode);
        tracing::trace!(reading, mode = ?self.mode, "memory reading");
        reading
    }

    pub fn request_start(&self) -> u64 {
        self.request_start
    }

    /// Overrides the request-start reading, e.g. with one taken before the ledger existed.
    pub fn set_request_start(&mut self, reading: u64) {
        self.request_start = reading;
    }

    pub fn request_end(&self) -> Option<u64> {
        self.request_end
    }

    /// Memory growth over the request, measured up to now if it has not been collected yet.
    pub fn request_duration(&self) -> i64 {
        let end = self.request_end.unwrap_or_else(|| self.read());
        delta(self.request_start, end)
    }

    pub fn peak_usage(&self) -> u64 {
        self.peak_usage
    }

    pub fn update_peak_usage(&mut self) {
        self.peak_usage = self.source.peak(self.mode);
    }

    /// Opens a measure under `name`. Restarting an open name replaces it.
    pub fn start_measure(&mut self, name: &str, label: Option<&str>, source: Option<&str>) {
        let start = self.read();
        self.sequence += 1;
        let label = label.filter(|l| !l.is_empty()).unwrap_or(name);
        tracing::debug!(name, label, start, "memory measure started");
        self.started.insert(
            name.to_string(),
            OpenMeasure {
                label: label.to_string(),
                start,
                source: source.map(str::to_owned),
                sequence: self.sequence,
            },
        );
    }

    pub fn has_started_measure(&self, name: &str) -> bool {
        self.started.contains_key(name)
    }

    pub fn open_measure(&self, name: &str) -> Option<&OpenMeasure> {
        self.started.get(name)
    }

    pub fn open_count(&self) -> usize {
        self.started.len()
    }

    /// Closes `name` if it is open. Returns `None` when it was never started.
    pub fn try_stop_measure(&mut self, name: &str, params: Option<Params>) -> Option<&FinalizedMeasure> {
        let open = self.started.remove(name)?;
        let end = self.read();
        Some(self.finalize(open.label, open.start, end, params.unwrap_or_default(), open.source))
    }

    pub fn stop_measure(&mut self, name: &str, params: Option<Params>) -> Result<(), LedgerError> {
        match self.try_stop_measure(name, params) {
            Some(_) => Ok(()),
            None => Err(LedgerError::MeasurementNotStarted {
                name: name.to_string(),
            }),
        }
    }

    /// Records an interval measured elsewhere.
    pub fn add_measure(
        &mut self,
        label: &str,
        start: u64,
        end: u64,
        params: Option<Params>,
        source: Option<&str>,
    ) {
        self.finalize(
            label.to_string(),
            start,
            end,
            params.unwrap_or_default(),
            source.map(str::to_owned),
        );
    }

    /// Opens a measure that closes when the returned guard is dropped.
    pub fn scope(&mut self, label: &str, source: Option<&str>) -> MeasureGuard<'_> {
        let name = self.start_scoped_measure(label, source);
        MeasureGuard::new(self, name)
    }

    /// Opens a measure under a generated name no open measure uses, and returns that name.
    pub fn start_scoped_measure(&mut self, label: &str, source: Option<&str>) -> String {
        let name = loop {
            self.sequence += 1;
            let candidate = format!("memlens::scope#{}", self.sequence);
            if !self.started.contains_key(&candidate) {
                break candidate;
            }
        };
        self.start_measure(&name, Some(label), source);
        name
    }

    /// Measures `work`. The measure is stopped on every exit path, unwinding included,
    /// with whatever parameters `work` returned.
    pub fn measure<F, R>(&mut self, label: &str, source: Option<&str>, work: F)
    where
        F: FnOnce(&mut MeasureGuard<'_>) -> R,
        R: IntoParams,
    {
        let mut guard = self.scope(label, source);
        if let Some(params) = work(&mut guard).into_params() {
            guard.set_params(params);
        }
    }

    pub fn measures(&self) -> &[FinalizedMeasure] {
        &self.measures
    }

    /// Closes whatever is still open and summarizes the request.
    ///
    /// Calling this again re-reads the request end; the last call wins.
    pub fn collect(&mut self) -> MemorySnapshot {
        let end = self.read();
        self.request_end = Some(end);
        self.update_peak_usage();
        self.peak_usage = self.peak_usage.max(end);

        let mut pending: Vec<(u64, String)> = self
            .started
            .iter()
            .map(|(name, open)| (open.sequence, name.clone()))
            .collect();
        pending.sort_unstable();
        if !pending.is_empty() {
            tracing::warn!(count = pending.len(), "closing memory measures still open at collection");
        }
        for (_, name) in pending {
            self.try_stop_measure(&name, None);
        }

        self.measures.sort_by_key(|m| m.start);

        let duration = delta(self.request_start, end);
        MemorySnapshot {
            start: self.request_start,
            end,
            duration,
            duration_str: self.formatter.format_bytes(duration),
            peak_usage: self.peak_usage,
            peak_usage_str: self.formatter.format_bytes(i64::try_from(self.peak_usage).unwrap_or(i64::MAX)),
            measures: Measures::new(self.layout, self.measures.clone()),
        }
    }

    pub fn widgets(&self) -> Widgets {
        memory_widgets(self.layout)
    }

    fn finalize(
        &mut self,
        label: String,
        start: u64,
        end: u64,
        params: Params,
        source: Option<String>,
    ) -> &FinalizedMeasure {
        let duration = delta(start, end);
        tracing::debug!(label = %label, start, end, duration, "memory measure recorded");
        let measure = FinalizedMeasure {
            relative_start: delta(self.request_start, start),
            relative_end: self.request_end.map(|request_end| delta(request_end, end)),
            duration_str: self.formatter.format_bytes(duration),
            label,
            start,
            end,
            duration,
            params,
            source,
        };

        let replaced = match self.layout {
            MeasureLayout::ByLabel => self.measures.iter().position(|m| m.label == measure.label),
            MeasureLayout::Timeline => None,
        };
        let index = match replaced {
            Some(index) => {
                self.measures[index] = measure;
                index
            }
            None => {
                self.measures.push(measure);
                self.measures.len() - 1
            }
        };
        &self.measures[index]
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryLedger")
            .field("mode", &self.mode)
            .field("layout", &self.layout)
            .field("request_start", &self.request_start)
            .field("request_end", &self.request_end)
            .field("peak_usage", &self.peak_usage)
            .field("open", &self.started.len())
            .field("measures", &self.measures.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memlens_env::ScriptedMemory;
    use serde_json::json;

    fn ledger(readings: impl IntoIterator<Item = u64>) -> MemoryLedger {
        MemoryLedger::with_source(ScriptedMemory::new(readings), MemoryMode::Used)
    }

    #[test]
    fn started_measure_is_reported() {
        let mut ledger = ledger([0, 10]);
        ledger.start_measure("test", None, None);
        assert!(ledger.has_started_measure("test"));
        assert!(!ledger.has_started_measure("other"));
    }

    #[test]
    fn stopping_unknown_measure_fails() {
        let mut ledger = ledger([0]);
        let err = ledger.stop_measure("missing", None).unwrap_err();
        assert_eq!(
            err,
            LedgerError::MeasurementNotStarted {
                name: "missing".to_string()
            }
        );
        assert!(err.to_string().contains("'missing'"));
        assert!(ledger.try_stop_measure("missing", None).is_none());
    }

    #[test]
    fn add_measure_records_given_readings() {
        let mut ledger = ledger([0]);
        ledger.add_measure("test", 1, 2, None, None);
        let measure = &ledger.measures()[0];
        assert_eq!(measure.label, "test");
        assert_eq!((measure.start, measure.end, measure.duration), (1, 2, 1));
        assert_eq!(measure.duration_str, "1B");
    }

    #[test]
    fn stop_measure_closes_interval() {
        let mut ledger = ledger([100, 150, 400]);
        ledger.start_measure("test", None, None);
        ledger.stop_measure("test", None).unwrap();

        assert!(!ledger.has_started_measure("test"));
        let measure = &ledger.measures()[0];
        assert_eq!(measure.label, "test");
        assert!(measure.end >= measure.start);
        assert_eq!(measure.duration, 250);
        assert_eq!(measure.relative_start, 50);
        assert_eq!(measure.relative_end, None);
    }

    #[test]
    fn label_defaults_to_name() {
        let mut ledger = ledger([0, 1, 2, 3, 4]);
        ledger.start_measure("a", None, None);
        ledger.start_measure("b", Some("Boot"), Some("kernel"));
        ledger.stop_measure("a", None).unwrap();
        ledger.stop_measure("b", None).unwrap();

        assert_eq!(ledger.measures()[0].label, "a");
        assert_eq!(ledger.measures()[1].label, "Boot");
        assert_eq!(ledger.measures()[1].source.as_deref(), Some("kernel"));
    }

    #[test]
    fn restart_replaces_start_reading() {
        let mut ledger = ledger([0, 10, 20, 50]);
        ledger.start_measure("test", None, None);
        ledger.start_measure("test", None, None);
        assert_eq!(ledger.open_count(), 1);
        ledger.stop_measure("test", None).unwrap();
        assert_eq!(ledger.measures()[0].start, 20);
        assert_eq!(ledger.measures()[0].duration, 30);
    }

    #[test]
    fn collect_reports_stopped_measures() {
        let mut ledger = ledger([0, 10, 20, 30]);
        ledger.start_measure("test", None, None);
        ledger.stop_measure("test", None).unwrap();
        let snapshot = ledger.collect();
        assert!(snapshot.measures.contains("test"));
        assert_eq!(snapshot.end, 30);
    }

    #[test]
    fn collect_closes_open_measures() {
        let mut ledger = ledger([0, 10, 50, 60]);
        ledger.start_measure("open", None, None);
        let snapshot = ledger.collect();

        assert!(!ledger.has_started_measure("open"));
        let measure = snapshot.measures.get("open").unwrap();
        assert_eq!((measure.start, measure.end), (10, 60));
        assert_eq!(measure.relative_end, Some(10));
        assert!(measure.params.is_empty());
    }

    #[test]
    fn collect_closes_open_measures_in_start_order() {
        let mut ledger = ledger([0, 10, 10, 10, 50, 60, 70, 80]);
        ledger.start_measure("first", None, None);
        ledger.start_measure("second", None, None);
        ledger.start_measure("third", None, None);
        let snapshot = ledger.collect();

        assert_eq!(ledger.open_count(), 0);
        let closed: Vec<(&str, u64)> = snapshot.measures.iter().map(|m| (m.label.as_str(), m.end)).collect();
        assert_eq!(closed, [("first", 60), ("second", 70), ("third", 80)]);
    }

    #[test]
    fn scoped_name_skips_names_already_open() {
        let mut ledger = ledger([0, 10, 20, 30]);
        ledger.start_measure("memlens::scope#2", Some("user"), None);
        ledger.measure("scoped", None, |scope| {
            assert_ne!(scope.name(), "memlens::scope#2");
        });

        assert!(ledger.has_started_measure("memlens::scope#2"));
        assert_eq!(ledger.open_measure("memlens::scope#2").map(|m| m.label.as_str()), Some("user"));
        assert_eq!(ledger.measures().len(), 1);
        assert_eq!(ledger.measures()[0].label, "scoped");
    }

    #[test]
    fn peak_is_never_below_request_end() {
        let source = ScriptedMemory::new([0, 10]).with_peak(5);
        let mut ledger = MemoryLedger::with_source(source, MemoryMode::Used);
        let snapshot = ledger.collect();
        assert_eq!(snapshot.end, 10);
        assert_eq!(snapshot.peak_usage, 10);
    }

    #[test]
    fn huge_peak_formats_without_wrapping() {
        let source = ScriptedMemory::fixed(0).with_peak(u64::MAX);
        let mut ledger = MemoryLedger::with_source(source, MemoryMode::Used);
        let snapshot = ledger.collect();
        assert_eq!(snapshot.peak_usage, u64::MAX);
        assert!(!snapshot.peak_usage_str.starts_with('-'));
    }

    #[test]
    fn collect_sorts_by_start_and_keeps_ties_in_order() {
        let mut ledger = ledger([0]);
        ledger.add_measure("a", 5, 6, None, None);
        ledger.add_measure("b", 1, 2, None, None);
        ledger.add_measure("c", 5, 9, None, None);
        ledger.add_measure("d", 1, 3, None, None);

        let snapshot = ledger.collect();
        let labels: Vec<&str> = snapshot.measures.iter().map(|m| m.label.as_str()).collect();
        assert_eq!(labels, ["b", "d", "a", "c"]);
    }

    #[test]
    fn measures_keep_insertion_order_before_collect() {
        let mut ledger = ledger([0]);
        ledger.add_measure("late", 9, 10, None, None);
        ledger.add_measure("early", 1, 2, None, None);
        assert_eq!(ledger.measures()[0].label, "late");
    }

    #[test]
    fn repeated_collect_rereads_request_end() {
        let mut ledger = ledger([0, 10, 20]);
        assert_eq!(ledger.collect().end, 10);
        assert_eq!(ledger.collect().end, 20);
        assert_eq!(ledger.request_end(), Some(20));
    }

    #[test]
    fn by_label_layout_replaces_same_label() {
        let mut ledger = ledger([0]).with_layout(MeasureLayout::ByLabel);
        ledger.add_measure("x", 1, 2, None, None);
        ledger.add_measure("y", 1, 5, None, None);
        ledger.add_measure("x", 3, 9, None, None);

        assert_eq!(ledger.measures().len(), 2);
        assert_eq!(ledger.measures()[0].label, "x");
        assert_eq!(ledger.measures()[0].start, 3);
    }

    #[test]
    fn timeline_layout_keeps_repeats() {
        let mut ledger = ledger([0]);
        ledger.add_measure("x", 1, 2, None, None);
        ledger.add_measure("x", 3, 9, None, None);
        assert_eq!(ledger.measures().len(), 2);
    }

    #[test]
    fn measure_attaches_returned_params() {
        let mut ledger = ledger([0, 10, 30]);
        ledger.measure("query", Some("db"), |_| {
            let mut params = Params::new();
            params.insert("rows".to_string(), json!(3));
            params
        });

        assert_eq!(ledger.open_count(), 0);
        let measure = &ledger.measures()[0];
        assert_eq!(measure.label, "query");
        assert_eq!(measure.duration, 20);
        assert_eq!(measure.params["rows"], json!(3));
        assert_eq!(measure.source.as_deref(), Some("db"));
    }

    #[test]
    fn measure_without_params_records_empty_params() {
        let mut ledger = ledger([0, 10, 30]);
        ledger.measure("noop", None, |_| ());
        assert!(ledger.measures()[0].params.is_empty());
    }

    #[test]
    fn measure_stops_when_work_panics() {
        let mut ledger = ledger([0, 10, 30]);
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            ledger.measure("boom", None, |_| -> () { panic!("work failed") });
        }));

        assert!(outcome.is_err());
        assert_eq!(ledger.open_count(), 0);
        assert_eq!(ledger.measures()[0].label, "boom");
        assert_eq!(ledger.measures()[0].end, 30);
    }

    #[test]
    fn nested_measures_share_the_ledger() {
        let mut ledger = ledger([0, 1, 2, 3, 4]);
        ledger.measure("outer", None, |scope| {
            scope.measure("inner", None, |_| ());
        });

        let labels: Vec<&str> = ledger.measures().iter().map(|m| m.label.as_str()).collect();
        assert_eq!(labels, ["inner", "outer"]);
        assert_eq!(ledger.measures()[1].start, 1);
        assert_eq!(ledger.measures()[1].end, 4);
    }

    #[test]
    fn snapshot_summarizes_request() {
        let source = ScriptedMemory::new([1024, 3072]).with_peak(4096);
        let mut ledger = MemoryLedger::with_source(source, MemoryMode::Allocated);
        let snapshot = ledger.collect();

        assert_eq!(snapshot.duration, 2048);
        assert_eq!(snapshot.duration_str, "2KB");
        assert_eq!(snapshot.peak_usage, 4096);
        assert_eq!(snapshot.peak_usage_str, "4KB");
        assert_eq!(ledger.request_duration(), 2048);
    }

    #[test]
    fn snapshot_serializes_per_layout() {
        let mut timeline = ledger([0]);
        timeline.add_measure("test", 0, 2048, None, None);
        let value = serde_json::to_value(timeline.collect()).unwrap();
        assert_eq!(value["measures"][0]["label"], "test");
        assert_eq!(value["measures"][0]["duration_str"], "2KB");

        let mut by_label = ledger([0]).with_layout(MeasureLayout::ByLabel);
        by_label.add_measure("test", 0, 2048, None, None);
        let value = serde_json::to_value(by_label.collect()).unwrap();
        assert_eq!(value["measures"], json!({ "test": "2KB" }));
    }

    #[test]
    fn widgets_follow_layout() {
        let ledger = ledger([0]);
        assert_eq!(ledger.name(), "memory_details");
        let widget = &ledger.widgets()["memory_details"];
        assert_eq!(widget.widget, "PhpDebugBar.Widgets.TimelineWidget");
        assert_eq!(widget.map, "memory_details");

        let by_label = MemoryLedger::with_source(ScriptedMemory::fixed(0), MemoryMode::Used)
            .with_layout(MeasureLayout::ByLabel);
        let widget = &by_label.widgets()["memory_details"];
        assert_eq!(widget.map, "memory_details.measures");
        assert_eq!(widget.icon, "tasks");
        assert_eq!(widget.default, "{}");
    }

    #[test]
    fn real_usage_switches_mode() {
        let mut ledger = ledger([0]);
        assert!(!ledger.real_usage());
        ledger.set_real_usage(true);
        assert_eq!(ledger.mode(), MemoryMode::Allocated);
    }
}
