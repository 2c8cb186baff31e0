//! Queue binding configuration.

use std::time::Duration;

/// Where a producer publishes or a consumer listens.
///
/// Queues are plain named queues: one queue carries one event family, and
/// compensation uses a second, dedicated queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    pub broker_uri: String,
    pub queue_name: String,
    /// Upper bound on a single publish, including the broker acknowledgement.
    pub publish_timeout: Duration,
    /// Upper bound on a single domain handler invocation.
    pub handler_timeout: Duration,
}

impl QueueConfig {
    pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);
    pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(5);

    /// Creates a binding with default timeouts.
    pub fn new(broker_uri: impl Into<String>, queue_name: impl Into<String>) -> Self {
        Self {
            broker_uri: broker_uri.into(),
            queue_name: queue_name.into(),
            publish_timeout: Self::DEFAULT_PUBLISH_TIMEOUT,
            handler_timeout: Self::DEFAULT_HANDLER_TIMEOUT,
        }
    }

    /// Returns the same broker binding pointed at another queue.
    pub fn for_queue(&self, queue_name: impl Into<String>) -> Self {
        Self {
            queue_name: queue_name.into(),
            ..self.clone()
        }
    }

    pub fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }

    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = timeout;
        self
    }
}
