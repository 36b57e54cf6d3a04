//! Start/stop helpers for application code
//!
//! Helpers bundle a ledger handle with an error policy so call sites do not
//! have to decide what a stop without a start means.

use crate::handle::LedgerHandle;
use crate::settings::ErrorPolicy;
use memlens_metrics::LedgerError;
use std::cell::RefCell;

/// Receives ledger errors that helpers swallow.
pub trait ErrorSink {
    fn report(&self, error: &LedgerError);
}

/// Logs reported errors as warnings.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ErrorSink for TracingSink {
    fn report(&self, error: &LedgerError) {
        tracing::warn!(error = %error, "memory measure error");
    }
}

/// Keeps reported errors in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    errors: RefCell<Vec<LedgerError>>,
}

impl CollectingSink {
    pub fn errors(&self) -> Vec<LedgerError> {
        self.errors.borrow().clone()
    }
}

impl ErrorSink for CollectingSink {
    fn report(&self, error: &LedgerError) {
        self.errors.borrow_mut().push(error.clone());
    }
}

impl<S: ErrorSink + ?Sized> ErrorSink for std::rc::Rc<S> {
    fn report(&self, error: &LedgerError) {
        (**self).report(error);
    }
}

pub struct MemoryHelpers {
    handle: LedgerHandle,
    policy: ErrorPolicy,
    sink: Box<dyn ErrorSink>,
}

impl MemoryHelpers {
    pub fn new(handle: LedgerHandle, policy: ErrorPolicy) -> Self {
        Self {
            handle,
            policy,
            sink: Box::new(TracingSink),
        }
    }

    pub fn with_sink(mut self, sink: impl ErrorSink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    pub fn handle(&self) -> &LedgerHandle {
        &self.handle
    }

    pub fn policy(&self) -> ErrorPolicy {
        self.policy
    }

    /// Starts a measure; `name` is used to stop it, `label` is what gets displayed.
    pub fn start_memory_measure(&self, name: &str, label: Option<&str>) -> Result<(), LedgerError> {
        self.apply_policy(self.handle.try_start_measure(name, label, None))
    }

    /// Stops a measure. Under [`ErrorPolicy::Report`] a missing measure or a
    /// busy ledger is reported to the sink and `Ok(())` is returned.
    pub fn stop_memory_measure(&self, name: &str) -> Result<(), LedgerError> {
        self.apply_policy(self.handle.stop_measure(name, None))
    }

    fn apply_policy(&self, outcome: Result<(), LedgerError>) -> Result<(), LedgerError> {
        match outcome {
            Err(err) if self.policy == ErrorPolicy::Report => {
                self.sink.report(&err);
                Ok(())
            }
            other => other,
        }
    }
}
