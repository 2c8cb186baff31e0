//! Queue producer.

use std::sync::Arc;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use super::{Broker, NatsBroker};
use crate::config::QueueConfig;
use crate::error::{BrokerError, Result};

/// Publishes raw payloads to one named queue.
///
/// There is no local retry or buffering: a rejected publish is returned to
/// the caller as is.
pub struct Producer {
    broker: Arc<dyn Broker>,
    config: QueueConfig,
}

impl Producer {
    /// Creates a producer on an existing connection.
    pub fn new(broker: Arc<dyn Broker>, config: QueueConfig) -> Self {
        Self { broker, config }
    }

    /// Dials a dedicated NATS connection for this producer.
    pub async fn connect(config: QueueConfig) -> Result<Self> {
        tracing::info!(queue = %config.queue_name, "creating producer");
        let broker = NatsBroker::connect(&config.broker_uri).await?;
        Ok(Self::new(Arc::new(broker), config))
    }

    pub fn queue(&self) -> &str {
        &self.config.queue_name
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Publishes `payload` to the queue.
    ///
    /// Fails with [`BrokerError::Cancelled`] without touching the broker if
    /// `cancel` has already fired, and with [`BrokerError::Timeout`] if the
    /// broker does not accept the message within the publish timeout.
    #[tracing::instrument(skip(self, cancel, payload), fields(queue = %self.config.queue_name, size = payload.len()))]
    pub async fn produce(&self, cancel: &CancellationToken, payload: Bytes) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(BrokerError::Cancelled);
        }

        let publish = self.broker.publish(&self.config.queue_name, payload);
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(BrokerError::Cancelled),
            published = tokio::time::timeout(self.config.publish_timeout, publish) => {
                published.unwrap_or_else(|_| {
                    Err(BrokerError::Timeout {
                        queue: self.config.queue_name.clone(),
                        after: self.config.publish_timeout,
                    })
                })
            }
        };

        match &result {
            Ok(()) => tracing::debug!("message published"),
            Err(e) => tracing::error!(error = %e, "publishing message"),
        }
        result
    }

    /// Tears down the producer's connection.
    pub async fn close(&self) -> Result<()> {
        tracing::info!(queue = %self.config.queue_name, "closing producer");
        self.broker.close().await
    }
}
