//! NATS-backed broker.
//!
//! A named queue maps to a NATS subject plus a queue group of the same name,
//! so every consumer bound to the queue competes for its messages the way
//! consumers of one AMQP queue do. Core NATS does not persist messages:
//! anything published while no consumer is bound is dropped.
//!
//! Closing flushes pending writes and ends every delivery stream the broker
//! handed out. Dropping a stream unsubscribes it from the server; the socket
//! itself goes away with the last handle to the broker.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use super::{Broker, Deliveries};
use crate::error::{BrokerError, Result};

/// One connection to a NATS server.
pub struct NatsBroker {
    client: async_nats::Client,
    uri: String,
    closed: CancellationToken,
}

impl NatsBroker {
    /// Dials the broker.
    #[tracing::instrument]
    pub async fn connect(uri: &str) -> Result<Self> {
        let client = async_nats::connect(uri).await.map_err(|e| {
            tracing::error!(error = %e, "dialing broker");
            BrokerError::connect(uri, e)
        })?;
        tracing::info!("connected to broker");
        Ok(Self {
            client,
            uri: uri.to_string(),
            closed: CancellationToken::new(),
        })
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }
}

#[async_trait]
impl Broker for NatsBroker {
    async fn publish(&self, queue: &str, payload: Bytes) -> Result<()> {
        if self.closed.is_cancelled() {
            return Err(BrokerError::Closed);
        }
        self.client
            .publish(queue.to_string(), payload)
            .await
            .map_err(|e| BrokerError::publish(queue, e))?;
        // Flushing waits for the server to take the write.
        self.client
            .flush()
            .await
            .map_err(|e| BrokerError::publish(queue, e))
    }

    async fn subscribe(&self, queue: &str) -> Result<Deliveries> {
        if self.closed.is_cancelled() {
            return Err(BrokerError::Closed);
        }
        let subscriber = self
            .client
            .queue_subscribe(queue.to_string(), queue.to_string())
            .await
            .map_err(|e| BrokerError::subscribe(queue, e))?;
        let deliveries = subscriber
            .map(|message| message.payload)
            .take_until(self.closed.clone().cancelled_owned());
        Ok(Box::pin(deliveries))
    }

    async fn close(&self) -> Result<()> {
        if self.closed.is_cancelled() {
            return Ok(());
        }
        tracing::info!(uri = %self.uri, "closing broker connection");
        let flushed = self
            .client
            .flush()
            .await
            .map_err(|e| BrokerError::Close(Box::new(e)));
        self.closed.cancel();
        flushed
    }
}
