//! Broker error types.

use std::time::Duration;

use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while producing, consuming or handling messages.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Connecting to the broker failed.
    #[error("Connecting to broker at {uri} failed: {source}")]
    Connect {
        uri: String,
        #[source]
        source: BoxError,
    },

    /// The broker rejected a publish.
    #[error("Publishing to queue '{queue}' failed: {source}")]
    Publish {
        queue: String,
        #[source]
        source: BoxError,
    },

    /// Binding a consumer to a queue failed.
    #[error("Subscribing to queue '{queue}' failed: {source}")]
    Subscribe {
        queue: String,
        #[source]
        source: BoxError,
    },

    /// Tearing down the connection failed.
    #[error("Closing broker connection failed: {0}")]
    Close(#[source] BoxError),

    /// The broker connection has already been closed.
    #[error("Broker connection is closed")]
    Closed,

    /// The operation was cancelled before it completed.
    #[error("Operation cancelled")]
    Cancelled,

    /// Publishing did not complete in time.
    #[error("Publishing to queue '{queue}' timed out after {after:?}")]
    Timeout { queue: String, after: Duration },

    /// A domain handler did not finish in time.
    #[error("Handler for '{message_type}' timed out after {after:?}")]
    HandlerTimeout { message_type: String, after: Duration },

    /// An envelope could not be encoded.
    #[error("Encoding envelope failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// Received bytes are not a valid envelope or payload.
    #[error("Decoding envelope failed: {0}")]
    Decode(#[source] serde_json::Error),

    /// The envelope decoded but violates the schema.
    #[error("Invalid envelope: {0}")]
    InvalidEnvelope(String),

    /// A domain handler failed.
    #[error("Handler error: {0}")]
    Handler(#[source] BoxError),
}

impl BrokerError {
    pub fn connect(uri: impl Into<String>, source: impl Into<BoxError>) -> Self {
        BrokerError::Connect {
            uri: uri.into(),
            source: source.into(),
        }
    }

    pub fn publish(queue: impl Into<String>, source: impl Into<BoxError>) -> Self {
        BrokerError::Publish {
            queue: queue.into(),
            source: source.into(),
        }
    }

    pub fn subscribe(queue: impl Into<String>, source: impl Into<BoxError>) -> Self {
        BrokerError::Subscribe {
            queue: queue.into(),
            source: source.into(),
        }
    }

    /// Wraps an error returned by a domain handler.
    pub fn handler(source: impl Into<BoxError>) -> Self {
        BrokerError::Handler(source.into())
    }
}

/// Convenience type alias for broker results.
pub type Result<T> = std::result::Result<T, BrokerError>;
