//! Queue consumer with fan-out to registered listeners.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{Broker, Deliveries, NatsBroker};
use crate::config::QueueConfig;
use crate::error::Result;

/// Receives every raw message delivered on a consumer's queue.
#[async_trait]
pub trait Listener: Send + Sync {
    /// Name used in log records.
    fn name(&self) -> &str;

    /// Handles one message body. Errors are logged by the consumer and do
    /// not stop delivery to the remaining listeners.
    async fn on_message(&self, body: &Bytes) -> Result<()>;
}

/// Binds to one named queue and fans each delivery out to every listener.
///
/// Listeners run one after another, in registration order, on the single
/// task driving [`Consumer::listen`]. Registration may happen at any time,
/// including while a delivery is in progress; a listener added mid-delivery
/// sees the next message.
pub struct Consumer {
    broker: Arc<dyn Broker>,
    config: QueueConfig,
    deliveries: tokio::sync::Mutex<Option<Deliveries>>,
    listeners: RwLock<Vec<Arc<dyn Listener>>>,
}

impl Consumer {
    /// Binds to the configured queue on an existing connection.
    pub async fn new(broker: Arc<dyn Broker>, config: QueueConfig) -> Result<Self> {
        tracing::info!(queue = %config.queue_name, "creating consumer");
        let deliveries = broker.subscribe(&config.queue_name).await?;
        Ok(Self {
            broker,
            config,
            deliveries: tokio::sync::Mutex::new(Some(deliveries)),
            listeners: RwLock::new(Vec::new()),
        })
    }

    /// Dials a dedicated NATS connection and binds to the configured queue.
    pub async fn connect(config: QueueConfig) -> Result<Self> {
        let broker = NatsBroker::connect(&config.broker_uri).await?;
        Self::new(Arc::new(broker), config).await
    }

    pub fn queue(&self) -> &str {
        &self.config.queue_name
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Registers a listener for every subsequent delivery.
    pub fn subscribe(&self, listener: Arc<dyn Listener>) {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        listeners.push(listener);
        tracing::info!(
            queue = %self.config.queue_name,
            total_listeners = listeners.len(),
            "adding listener"
        );
    }

    /// Returns the number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Invokes every registered listener with `body`, in registration order.
    pub async fn deliver(&self, body: &Bytes) {
        let listeners: Vec<Arc<dyn Listener>> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for listener in listeners {
            if let Err(e) = listener.on_message(body).await {
                tracing::error!(
                    queue = %self.config.queue_name,
                    listener = listener.name(),
                    error = %e,
                    "error delivering message"
                );
            }
        }
    }

    /// Pumps deliveries until `stop` fires or the connection closes.
    ///
    /// A delivery that is already being handed to listeners when `stop`
    /// fires runs to completion. Only one call drives the queue; a second
    /// call returns immediately.
    #[tracing::instrument(skip(self, stop), fields(queue = %self.config.queue_name))]
    pub async fn listen(&self, stop: CancellationToken) {
        let Some(mut deliveries) = self.deliveries.lock().await.take() else {
            tracing::warn!("consumer is already listening");
            return;
        };

        loop {
            tokio::select! {
                biased;
                () = stop.cancelled() => {
                    tracing::info!("stop signal received");
                    break;
                }
                next = deliveries.next() => match next {
                    Some(body) => {
                        metrics::counter!("broker_deliveries_total", "queue" => self.config.queue_name.clone())
                            .increment(1);
                        tracing::debug!(size = body.len(), "received message");
                        self.deliver(&body).await;
                    }
                    None => {
                        tracing::info!("delivery source closed");
                        break;
                    }
                },
            }
        }
    }

    /// Runs [`Consumer::listen`] on a dedicated task.
    pub fn spawn(self: &Arc<Self>, stop: CancellationToken) -> JoinHandle<()> {
        let consumer = Arc::clone(self);
        tokio::spawn(async move { consumer.listen(stop).await })
    }

    /// Tears down the consumer's connection.
    pub async fn close(&self) -> Result<()> {
        tracing::info!(queue = %self.config.queue_name, "closing consumer");
        self.broker.close().await
    }
}
