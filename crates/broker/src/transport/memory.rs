//! In-memory broker for tests and single-process runs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;

use super::{Broker, Deliveries};
use crate::envelope::Envelope;
use crate::error::{BrokerError, Result};

/// A named queue: messages buffer until some bound stream takes them.
struct Queue {
    sender: mpsc::UnboundedSender<Bytes>,
    receiver: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Bytes>>>,
}

impl Queue {
    fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Arc::new(tokio::sync::Mutex::new(receiver)),
        }
    }
}

#[derive(Default)]
struct InMemoryBrokerState {
    queues: HashMap<String, Queue>,
    published: Vec<(String, Bytes)>,
    fail_on_publish: bool,
    closed: bool,
}

impl InMemoryBrokerState {
    fn queue(&mut self, name: &str) -> &mut Queue {
        self.queues.entry(name.to_string()).or_insert_with(Queue::new)
    }
}

/// In-memory broker.
///
/// Clones share the same queues, so a producer and a consumer built from
/// clones of one broker talk to each other. Closing any clone closes them
/// all: bound streams end once their buffered messages are drained.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<Mutex<InMemoryBrokerState>>,
}

impl InMemoryBroker {
    /// Creates a new in-memory broker with no queues.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, InMemoryBrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Configures every subsequent publish to be rejected.
    pub fn set_fail_on_publish(&self, fail: bool) {
        self.state().fail_on_publish = fail;
    }

    /// Returns every payload accepted for the given queue, in publish order.
    pub fn published(&self, queue: &str) -> Vec<Bytes> {
        self.state()
            .published
            .iter()
            .filter(|(q, _)| q == queue)
            .map(|(_, body)| body.clone())
            .collect()
    }

    /// Returns the number of payloads accepted for the given queue.
    pub fn published_count(&self, queue: &str) -> usize {
        self.state()
            .published
            .iter()
            .filter(|(q, _)| q == queue)
            .count()
    }

    /// Decodes every payload accepted for the given queue.
    pub fn published_envelopes<T: DeserializeOwned>(&self, queue: &str) -> Result<Vec<Envelope<T>>> {
        self.published(queue)
            .iter()
            .map(|body| Envelope::decode(body))
            .collect()
    }

    /// Returns true once the broker has been closed.
    pub fn is_closed(&self) -> bool {
        self.state().closed
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn publish(&self, queue: &str, payload: Bytes) -> Result<()> {
        let mut state = self.state();
        if state.closed {
            return Err(BrokerError::Closed);
        }
        if state.fail_on_publish {
            return Err(BrokerError::publish(queue, "publish rejected by broker"));
        }
        state.published.push((queue.to_string(), payload.clone()));
        state
            .queue(queue)
            .sender
            .send(payload)
            .map_err(|e| BrokerError::publish(queue, e.to_string()))
    }

    async fn subscribe(&self, queue: &str) -> Result<Deliveries> {
        let receiver = {
            let mut state = self.state();
            if state.closed {
                return Err(BrokerError::Closed);
            }
            Arc::clone(&state.queue(queue).receiver)
        };

        let deliveries = futures_util::stream::unfold(receiver, |receiver| async move {
            let next = receiver.lock().await.recv().await;
            next.map(|body| (body, receiver))
        });
        Ok(Box::pin(deliveries))
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.state();
        state.closed = true;
        // Dropping the senders ends every bound stream.
        state.queues.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn test_buffers_until_subscribed() {
        let broker = InMemoryBroker::new();
        broker.publish("rate", Bytes::from_static(b"one")).await.unwrap();

        let mut deliveries = broker.subscribe("rate").await.unwrap();
        assert_eq!(deliveries.next().await.unwrap(), Bytes::from_static(b"one"));
    }

    #[tokio::test]
    async fn test_queues_are_isolated() {
        let broker = InMemoryBroker::new();
        broker.publish("user", Bytes::from_static(b"u")).await.unwrap();
        broker.publish("rate", Bytes::from_static(b"r")).await.unwrap();

        let mut deliveries = broker.subscribe("rate").await.unwrap();
        assert_eq!(deliveries.next().await.unwrap(), Bytes::from_static(b"r"));
        assert_eq!(broker.published_count("user"), 1);
        assert_eq!(broker.published_count("rate"), 1);
    }

    #[tokio::test]
    async fn test_fail_on_publish() {
        let broker = InMemoryBroker::new();
        broker.set_fail_on_publish(true);

        let result = broker.publish("user", Bytes::from_static(b"x")).await;
        assert!(matches!(result, Err(BrokerError::Publish { .. })));
        assert_eq!(broker.published_count("user"), 0);
    }

    #[tokio::test]
    async fn test_close_ends_deliveries() {
        let broker = InMemoryBroker::new();
        let mut deliveries = broker.subscribe("user").await.unwrap();
        broker.publish("user", Bytes::from_static(b"last")).await.unwrap();

        broker.close().await.unwrap();
        assert!(broker.is_closed());
        assert_eq!(deliveries.next().await.unwrap(), Bytes::from_static(b"last"));
        assert!(deliveries.next().await.is_none());

        let result = broker.publish("user", Bytes::new()).await;
        assert!(matches!(result, Err(BrokerError::Closed)));
    }
}
