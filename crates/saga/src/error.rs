//! Saga error types.

use std::time::Duration;

use broker::BrokerError;
use common::CallError;
use thiserror::Error;

use crate::registry::RegistryError;

/// Errors that can occur during saga operations.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The local registry rejected the mutation. Nothing was published.
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// The caller cancelled before the registry call finished.
    #[error("Registry call cancelled")]
    Cancelled,

    /// The registry call did not finish within the deadline.
    #[error("Registry call exceeded deadline of {0:?}")]
    DeadlineExceeded(Duration),

    /// The blocking worker running the registry call failed.
    #[error("Registry worker failed: {0}")]
    Worker(String),

    /// The local mutation committed but the event was not published.
    ///
    /// The row is not rolled back; the downstream mirror may never hear
    /// about it.
    #[error("Subscriber '{email}' stored but notification failed: {source}")]
    NotificationFailed {
        email: String,
        #[source]
        source: BrokerError,
    },

    /// Broker error outside of a committed mutation.
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),
}

impl SagaError {
    /// Returns true if the local mutation committed despite the error.
    pub fn is_committed(&self) -> bool {
        matches!(self, SagaError::NotificationFailed { .. })
    }
}

impl From<CallError<RegistryError>> for SagaError {
    fn from(err: CallError<RegistryError>) -> Self {
        match err {
            CallError::Cancelled => SagaError::Cancelled,
            CallError::DeadlineExceeded(after) => SagaError::DeadlineExceeded(after),
            CallError::Worker(reason) => SagaError::Worker(reason),
            CallError::Failed(e) => SagaError::Registry(e),
        }
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
