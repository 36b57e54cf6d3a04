use thiserror::Error;

/// Errors raised by the memory ledger's user-facing API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("Failed stopping measure '{name}' because it hasn't been started")]
    MeasurementNotStarted { name: String },

    #[error("Failed updating measure '{name}' because the ledger is busy")]
    LedgerBusy { name: String },
}
