//! Shared ledger handle
//!
//! The ledger is request-scoped and single-threaded. Code that records
//! measures receives a cloned handle instead of looking the ledger up.

use memlens_metrics::{IntoParams, LedgerError, MemoryLedger, MemorySnapshot, Params};
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Clone)]
pub struct LedgerHandle(Rc<RefCell<MemoryLedger>>);

impl LedgerHandle {
    pub fn new(ledger: MemoryLedger) -> Self {
        Self(Rc::new(RefCell::new(ledger)))
    }

    pub fn with<R>(&self, f: impl FnOnce(&MemoryLedger) -> R) -> R {
        f(&self.0.borrow())
    }

    /// # Panics
    ///
    /// If the ledger is already borrowed, e.g. from inside another `with_mut`.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut MemoryLedger) -> R) -> R {
        f(&mut self.0.borrow_mut())
    }

    /// Like [`Self::with_mut`], but returns `None` instead of panicking when the ledger is busy.
    pub fn try_with_mut<R>(&self, f: impl FnOnce(&mut MemoryLedger) -> R) -> Option<R> {
        let mut ledger = self.0.try_borrow_mut().ok()?;
        Some(f(&mut ledger))
    }

    pub fn start_measure(&self, name: &str, label: Option<&str>, source: Option<&str>) {
        self.with_mut(|ledger| ledger.start_measure(name, label, source));
    }

    /// Starts a measure, failing with [`LedgerError::LedgerBusy`] instead of panicking.
    pub fn try_start_measure(&self, name: &str, label: Option<&str>, source: Option<&str>) -> Result<(), LedgerError> {
        self.try_with_mut(|ledger| ledger.start_measure(name, label, source))
            .ok_or_else(|| LedgerError::LedgerBusy { name: name.to_string() })
    }

    pub fn has_started_measure(&self, name: &str) -> bool {
        self.with(|ledger| ledger.has_started_measure(name))
    }

    /// Stops a measure. A busy ledger yields [`LedgerError::LedgerBusy`].
    pub fn stop_measure(&self, name: &str, params: Option<Params>) -> Result<(), LedgerError> {
        self.try_with_mut(|ledger| ledger.stop_measure(name, params))
            .unwrap_or_else(|| Err(LedgerError::LedgerBusy { name: name.to_string() }))
    }

    pub fn add_measure(&self, label: &str, start: u64, end: u64, params: Option<Params>, source: Option<&str>) {
        self.with_mut(|ledger| ledger.add_measure(label, start, end, params, source));
    }

    /// Opens a measure closed when the returned scope drops.
    ///
    /// The ledger is not borrowed while the scope is alive, so the handle
    /// stays usable inside it.
    pub fn scope(&self, label: &str, source: Option<&str>) -> HandleScope {
        let name = self.with_mut(|ledger| ledger.start_scoped_measure(label, source));
        HandleScope {
            handle: self.clone(),
            name,
            params: None,
        }
    }

    /// Runs `work` inside a scope and records what it returns as parameters.
    pub fn measure<F, R>(&self, label: &str, source: Option<&str>, work: F)
    where
        F: FnOnce() -> R,
        R: IntoParams,
    {
        let mut scope = self.scope(label, source);
        scope.params = work().into_params();
    }

    pub fn collect(&self) -> MemorySnapshot {
        self.with_mut(MemoryLedger::collect)
    }
}

/// Scoped measure owned by a [`LedgerHandle`].
pub struct HandleScope {
    handle: LedgerHandle,
    name: String,
    params: Option<Params>,
}

impl HandleScope {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_params(&mut self, params: Params) {
        self.params = Some(params);
    }
}

impl Drop for HandleScope {
    fn drop(&mut self) {
        let params = self.params.take();
        let name = &self.name;
        if self.handle.try_with_mut(|ledger| ledger.try_stop_measure(name, params).is_some()).is_none() {
            tracing::error!(name = %name, "ledger busy; scoped measure left open");
        }
    }
}
