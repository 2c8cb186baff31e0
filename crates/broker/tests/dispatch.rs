//! Integration tests for typed dispatch over the in-memory transport.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use broker::events::{SUBSCRIPTIONS, SubscriberData, SubscriptionEvent};
use broker::{
    Broker, BrokerError, Consumer, Envelope, EventConsumer, EventHandler, EventProducer,
    InMemoryBroker, Producer, QueueConfig,
};
use tokio_util::sync::CancellationToken;

type Log = Arc<Mutex<Vec<String>>>;

struct Record {
    label: &'static str,
    log: Log,
    fail: bool,
}

#[async_trait]
impl EventHandler<SubscriberData> for Record {
    async fn handle(&self, envelope: &Envelope<SubscriberData>) -> broker::Result<()> {
        self.log
            .lock()
            .unwrap()
            .push(format!("{}:{}", self.label, envelope.data.email));
        if self.fail {
            return Err(BrokerError::handler("handler failed"));
        }
        Ok(())
    }
}

fn record(label: &'static str, log: &Log, fail: bool) -> Arc<Record> {
    Arc::new(Record {
        label,
        log: Arc::clone(log),
        fail,
    })
}

struct Harness {
    broker: InMemoryBroker,
    producer: EventProducer<SubscriberData>,
    events: EventConsumer<SubscriberData>,
}

impl Harness {
    async fn new() -> Self {
        let broker = InMemoryBroker::new();
        let config = QueueConfig::new("memory://", "user");
        let producer = EventProducer::new(
            Producer::new(Arc::new(broker.clone()), config.clone()),
            SUBSCRIPTIONS,
        );
        let consumer = Consumer::new(Arc::new(broker.clone()), config)
            .await
            .unwrap();
        let events = EventConsumer::new(Arc::new(consumer), SUBSCRIPTIONS);
        Self {
            broker,
            producer,
            events,
        }
    }

    async fn send(&self, event: SubscriptionEvent, email: &str) {
        self.producer
            .send_subscription(&CancellationToken::new(), event, email)
            .await
            .unwrap();
    }

    /// Drains everything published so far through the consumer.
    async fn drain(&self) {
        self.broker.close().await.unwrap();
        self.events
            .consumer()
            .listen(CancellationToken::new())
            .await;
    }
}

#[tokio::test]
async fn test_dispatches_by_type_in_delivery_order() {
    let h = Harness::new().await;
    let log: Log = Arc::default();
    h.events
        .on(SubscriptionEvent::Subscribed.as_str(), record("A", &log, false));
    h.events
        .on(SubscriptionEvent::Unsubscribed.as_str(), record("B", &log, false));

    h.send(SubscriptionEvent::Subscribed, "1@x.com").await;
    h.send(SubscriptionEvent::Subscribed, "2@x.com").await;
    h.send(SubscriptionEvent::Unsubscribed, "3@x.com").await;
    h.drain().await;

    assert_eq!(
        *log.lock().unwrap(),
        vec!["A:1@x.com", "A:2@x.com", "B:3@x.com"]
    );
}

#[tokio::test]
async fn test_handler_for_other_type_never_invoked() {
    let h = Harness::new().await;
    let log: Log = Arc::default();
    h.events.on(
        SubscriptionEvent::CompensateSubscribed.as_str(),
        record("compensate", &log, false),
    );

    h.send(SubscriptionEvent::Subscribed, "a@x.com").await;
    h.send(SubscriptionEvent::Unsubscribed, "a@x.com").await;
    h.drain().await;

    assert!(log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_failing_handler_does_not_block_the_next_one() {
    let h = Harness::new().await;
    let log: Log = Arc::default();
    h.events
        .on(SubscriptionEvent::Subscribed.as_str(), record("first", &log, true));
    h.events
        .on(SubscriptionEvent::Subscribed.as_str(), record("second", &log, false));

    h.send(SubscriptionEvent::Subscribed, "a@x.com").await;
    h.send(SubscriptionEvent::Subscribed, "b@x.com").await;
    h.drain().await;

    assert_eq!(
        *log.lock().unwrap(),
        vec!["first:a@x.com", "second:a@x.com", "first:b@x.com", "second:b@x.com"]
    );
}

#[tokio::test]
async fn test_malformed_message_is_dropped_and_delivery_continues() {
    let h = Harness::new().await;
    let log: Log = Arc::default();
    h.events
        .on(SubscriptionEvent::Subscribed.as_str(), record("A", &log, false));

    h.broker
        .publish("user", bytes::Bytes::from_static(b"{not json"))
        .await
        .unwrap();
    h.send(SubscriptionEvent::Subscribed, "a@x.com").await;
    h.drain().await;

    assert_eq!(*log.lock().unwrap(), vec!["A:a@x.com"]);
}

#[tokio::test]
async fn test_two_families_share_one_queue() {
    let h = Harness::new().await;
    let log: Log = Arc::default();
    let second = EventConsumer::<SubscriberData>::new(Arc::clone(h.events.consumer()), SUBSCRIPTIONS);
    h.events
        .on(SubscriptionEvent::Subscribed.as_str(), record("origin", &log, false));
    second.on(SubscriptionEvent::Subscribed.as_str(), record("mirror", &log, false));
    assert_eq!(h.events.consumer().listener_count(), 2);

    h.send(SubscriptionEvent::Subscribed, "a@x.com").await;
    h.drain().await;

    assert_eq!(*log.lock().unwrap(), vec!["origin:a@x.com", "mirror:a@x.com"]);
}
