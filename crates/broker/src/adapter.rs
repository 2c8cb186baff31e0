//! Typed producers and consumers over the raw transport.
//!
//! One [`EventProducer`] / [`EventConsumer`] pair serves every event family.
//! A family is plain data ([`Family`]): a name for logs and metrics, plus the
//! envelope kind its messages are stamped with. The payload type is the
//! generic parameter.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use common::EventId;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::envelope::{Envelope, EnvelopeKind};
use crate::error::{BrokerError, Result};
use crate::transport::{Consumer, Listener, Producer};

/// A group of message types that share one payload shape and one queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Family {
    pub name: &'static str,
    pub kind: EnvelopeKind,
}

/// Stamps payloads with an envelope, encodes them and publishes them.
pub struct EventProducer<P> {
    producer: Producer,
    family: Family,
    _payload: PhantomData<fn(P)>,
}

impl<P: Serialize> EventProducer<P> {
    pub fn new(producer: Producer, family: Family) -> Self {
        Self {
            producer,
            family,
            _payload: PhantomData,
        }
    }

    pub fn family(&self) -> Family {
        self.family
    }

    pub fn queue(&self) -> &str {
        self.producer.queue()
    }

    /// Wraps `data` in a fresh envelope of this family's kind.
    pub fn stamp(&self, message_type: &str, data: P) -> Envelope<P> {
        Envelope::new(self.family.kind, message_type, data)
    }

    /// Stamps and publishes a payload, returning the new envelope's id.
    pub async fn send(
        &self,
        cancel: &CancellationToken,
        message_type: &str,
        data: P,
    ) -> Result<EventId> {
        let envelope = self.stamp(message_type, data);
        self.publish(cancel, &envelope).await?;
        Ok(envelope.id)
    }

    /// Publishes an already stamped envelope as is.
    #[tracing::instrument(
        skip(self, cancel, envelope),
        fields(family = self.family.name, message_type = %envelope.message_type, id = %envelope.id)
    )]
    pub async fn publish(&self, cancel: &CancellationToken, envelope: &Envelope<P>) -> Result<()> {
        let body = envelope.encode()?;
        let size = body.len();
        tracing::info!("producing message");

        self.producer.produce(cancel, Bytes::from(body)).await?;

        metrics::counter!("broker_sent_messages_total", "family" => self.family.name).increment(1);
        metrics::histogram!("broker_message_size_bytes", "family" => self.family.name)
            .record(size as f64);
        Ok(())
    }

    pub async fn close(&self) -> Result<()> {
        self.producer.close().await
    }
}

/// Domain side of a consumer: handles decoded envelopes of one message type.
#[async_trait]
pub trait EventHandler<P>: Send + Sync {
    async fn handle(&self, envelope: &Envelope<P>) -> Result<()>;

    /// Bound the dispatcher puts on one [`EventHandler::handle`] call, given
    /// the queue's handler timeout. `None` means the handler bounds its own
    /// work and must not be cut off partway.
    fn timeout(&self, handler_timeout: Duration) -> Option<Duration> {
        Some(handler_timeout)
    }
}

type HandlerTable<P> = HashMap<String, Vec<Arc<dyn EventHandler<P>>>>;

/// Dispatches one family's envelopes to handlers keyed by message type.
///
/// A single transport listener is registered per family. It decodes the
/// envelope header once and decodes the payload only when some handler is
/// registered for the message type; other types are skipped silently. Each
/// handler runs under the queue's handler timeout.
pub struct EventConsumer<P> {
    consumer: Arc<Consumer>,
    family: Family,
    handlers: Arc<RwLock<HandlerTable<P>>>,
}

impl<P> EventConsumer<P>
where
    P: DeserializeOwned + Send + Sync + 'static,
{
    /// Attaches a dispatcher for `family` to the consumer.
    pub fn new(consumer: Arc<Consumer>, family: Family) -> Self {
        let handlers = Arc::new(RwLock::new(HashMap::new()));
        consumer.subscribe(Arc::new(Dispatcher {
            family,
            handlers: Arc::clone(&handlers),
            timeout: consumer.config().handler_timeout,
        }));
        Self {
            consumer,
            family,
            handlers,
        }
    }

    pub fn family(&self) -> Family {
        self.family
    }

    pub fn consumer(&self) -> &Arc<Consumer> {
        &self.consumer
    }

    /// Registers a handler for one message type. Several handlers for the
    /// same type run in registration order.
    pub fn on(&self, message_type: impl Into<String>, handler: Arc<dyn EventHandler<P>>) {
        let message_type = message_type.into();
        tracing::debug!(family = self.family.name, %message_type, "registering handler");
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(message_type)
            .or_default()
            .push(handler);
    }

    /// Returns true if some handler is registered for `message_type`.
    pub fn handles(&self, message_type: &str) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(message_type)
    }

    /// Starts the consumer's delivery loop on its own task.
    pub fn start(&self, stop: CancellationToken) -> JoinHandle<()> {
        self.consumer.spawn(stop)
    }

    pub async fn close(&self) -> Result<()> {
        self.consumer.close().await
    }
}

struct Dispatcher<P> {
    family: Family,
    handlers: Arc<RwLock<HandlerTable<P>>>,
    timeout: Duration,
}

impl<P> Dispatcher<P> {
    fn handlers_for(&self, message_type: &str) -> Option<Vec<Arc<dyn EventHandler<P>>>> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(message_type)
            .cloned()
    }
}

#[async_trait]
impl<P> Listener for Dispatcher<P>
where
    P: DeserializeOwned + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        self.family.name
    }

    async fn on_message(&self, body: &Bytes) -> Result<()> {
        let mut header = Envelope::<serde_json::Value>::decode(body)?;
        let Some(handlers) = self.handlers_for(&header.message_type) else {
            tracing::debug!(
                family = self.family.name,
                message_type = %header.message_type,
                "ignoring message of unhandled type"
            );
            return Ok(());
        };

        metrics::counter!(
            "broker_received_messages_total",
            "family" => self.family.name,
            "event" => header.message_type.clone()
        )
        .increment(1);

        let data: P = serde_json::from_value(header.data.take()).map_err(BrokerError::Decode)?;
        let envelope = header.with_data(data);
        tracing::info!(
            family = self.family.name,
            message_type = %envelope.message_type,
            id = %envelope.id,
            "delivering message"
        );

        let mut first_error = None;
        for handler in handlers {
            let call = handler.handle(&envelope);
            let outcome = match handler.timeout(self.timeout) {
                Some(limit) => match tokio::time::timeout(limit, call).await {
                    Ok(result) => result,
                    Err(_) => Err(BrokerError::HandlerTimeout {
                        message_type: envelope.message_type.clone(),
                        after: limit,
                    }),
                },
                None => call.await,
            };
            if let Err(e) = outcome {
                tracing::error!(message_type = %envelope.message_type, error = %e, "handler failed");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueueConfig;
    use crate::transport::InMemoryBroker;
    use serde::Deserialize;
    use std::sync::Mutex;

    const TEST_FAMILY: Family = Family {
        name: "test",
        kind: EnvelopeKind::Event,
    };

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        text: String,
    }

    #[derive(Default)]
    struct Collect {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl EventHandler<Note> for Collect {
        async fn handle(&self, envelope: &Envelope<Note>) -> Result<()> {
            self.seen.lock().unwrap().push(envelope.data.text.clone());
            Ok(())
        }
    }

    struct Stall;

    #[async_trait]
    impl EventHandler<Note> for Stall {
        async fn handle(&self, _envelope: &Envelope<Note>) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        }
    }

    struct SelfBounded;

    #[async_trait]
    impl EventHandler<Note> for SelfBounded {
        async fn handle(&self, _envelope: &Envelope<Note>) -> Result<()> {
            tokio::time::sleep(Duration::from_millis(60)).await;
            Ok(())
        }

        fn timeout(&self, _handler_timeout: Duration) -> Option<Duration> {
            None
        }
    }

    async fn setup(handler_timeout: Duration) -> (InMemoryBroker, EventProducer<Note>, EventConsumer<Note>) {
        let broker = InMemoryBroker::new();
        let config = QueueConfig::new("memory://", "notes").with_handler_timeout(handler_timeout);
        let producer = EventProducer::new(
            Producer::new(Arc::new(broker.clone()), config.clone()),
            TEST_FAMILY,
        );
        let consumer = Consumer::new(Arc::new(broker.clone()), config).await.unwrap();
        let events = EventConsumer::new(Arc::new(consumer), TEST_FAMILY);
        (broker, producer, events)
    }

    fn note(text: &str) -> Note {
        Note {
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn test_send_stamps_family_kind_and_type() {
        let (broker, producer, _events) = setup(Duration::from_secs(1)).await;

        let id = producer
            .send(&CancellationToken::new(), "Noted", note("hi"))
            .await
            .unwrap();

        let published = broker.published_envelopes::<Note>("notes").unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].id, id);
        assert_eq!(published[0].kind, EnvelopeKind::Event);
        assert_eq!(published[0].message_type, "Noted");
        assert_eq!(published[0].data, note("hi"));
    }

    #[tokio::test]
    async fn test_unhandled_type_is_ignored() {
        let (_broker, producer, events) = setup(Duration::from_secs(1)).await;
        let collect = Arc::new(Collect::default());
        events.on("Noted", collect.clone());
        assert!(events.handles("Noted"));
        assert!(!events.handles("Other"));

        let body = producer.stamp("Other", note("skip")).encode().unwrap();
        events.consumer().deliver(&Bytes::from(body)).await;

        assert!(collect.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unhandled_type_with_foreign_payload_is_ignored() {
        let (_broker, _producer, events) = setup(Duration::from_secs(1)).await;
        events.on("Noted", Arc::new(Collect::default()));
        let body = br#"{"eventID":"1","eventType":"RateFetched","timestamp":"2024-06-01T12:00:00Z","data":{"from":"USD"}}"#;

        let dispatcher = Dispatcher {
            family: TEST_FAMILY,
            handlers: Arc::clone(&events.handlers),
            timeout: Duration::from_secs(1),
        };
        assert!(dispatcher.on_message(&Bytes::from_static(body)).await.is_ok());
    }

    #[tokio::test]
    async fn test_handler_timeout_is_reported() {
        let (_broker, producer, events) = setup(Duration::from_millis(20)).await;
        events.on("Noted", Arc::new(Stall));

        let body = Bytes::from(producer.stamp("Noted", note("slow")).encode().unwrap());
        let dispatcher = Dispatcher {
            family: TEST_FAMILY,
            handlers: Arc::clone(&events.handlers),
            timeout: Duration::from_millis(20),
        };

        let result = dispatcher.on_message(&body).await;
        assert!(matches!(result, Err(BrokerError::HandlerTimeout { .. })));
    }

    #[tokio::test]
    async fn test_self_bounded_handler_runs_past_handler_timeout() {
        let (_broker, producer, events) = setup(Duration::from_millis(20)).await;
        events.on("Noted", Arc::new(SelfBounded));

        let body = Bytes::from(producer.stamp("Noted", note("long")).encode().unwrap());
        let dispatcher = Dispatcher {
            family: TEST_FAMILY,
            handlers: Arc::clone(&events.handlers),
            timeout: Duration::from_millis(20),
        };

        assert!(dispatcher.on_message(&body).await.is_ok());
    }
}
