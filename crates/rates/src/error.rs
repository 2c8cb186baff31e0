//! Rates error types.

use std::time::Duration;

use broker::BrokerError;
use common::CallError;
use saga::RegistryError;
use thiserror::Error;

/// Errors that can occur while fetching, storing or mailing rates.
#[derive(Debug, Error)]
pub enum RatesError {
    /// A single rate source could not serve the pair.
    #[error("Rate source '{source_name}' failed: {reason}")]
    SourceFailed { source_name: String, reason: String },

    /// Every source in a fallback chain failed.
    #[error("Every rate source failed: {}", .0.join("; "))]
    Exhausted(Vec<String>),

    /// No rate has been stored for the pair yet.
    #[error("No rate stored for {from}-{to}")]
    NoRate { from: String, to: String },

    /// The rate repository rejected the call.
    #[error("Rate repository error: {0}")]
    Repository(String),

    /// The subscriber registry rejected the call.
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// The email backend failed to deliver.
    #[error("Mail delivery failed: {0}")]
    Mail(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation exceeded deadline of {0:?}")]
    DeadlineExceeded(Duration),

    #[error("Blocking worker failed: {0}")]
    Worker(String),

    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),
}

impl RatesError {
    pub fn source_failed(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        RatesError::SourceFailed {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }
}

impl<E: Into<RatesError>> From<CallError<E>> for RatesError {
    fn from(err: CallError<E>) -> Self {
        match err {
            CallError::Cancelled => RatesError::Cancelled,
            CallError::DeadlineExceeded(after) => RatesError::DeadlineExceeded(after),
            CallError::Worker(reason) => RatesError::Worker(reason),
            CallError::Failed(e) => e.into(),
        }
    }
}

/// Convenience type alias for rates results.
pub type Result<T> = std::result::Result<T, RatesError>;
