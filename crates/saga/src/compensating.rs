//! Downstream side of the subscription saga.
//!
//! The mirror applies each `Subscribe` / `Unsubscribe` it receives to its
//! own registry. When that fails it relabels the envelope as the matching
//! compensation, keeping id, timestamp and payload, and publishes it to the
//! origin's compensation queue.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use broker::{
    BrokerError, Envelope, EventConsumer, EventHandler, EventProducer, SubscriberData,
    SubscriptionEvent,
};
use common::{BlockingCaller, Subscriber};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, SagaError};
use crate::mutation::Mutation;
use crate::registry::SubscriberRegistry;
use crate::step::SagaStep;

const MODEL: &str = "subscriber";

/// Mirrors subscription mutations and requests compensation on failure.
pub struct SubscriptionMirror<R> {
    registry: Arc<R>,
    compensations: EventProducer<SubscriberData>,
    caller: BlockingCaller,
    shutdown: CancellationToken,
}

impl<R: SubscriberRegistry> SubscriptionMirror<R> {
    /// `compensations` must publish to the origin's compensation queue.
    /// `shutdown` bounds every registry call and compensation publish.
    pub fn new(
        registry: Arc<R>,
        compensations: EventProducer<SubscriberData>,
        caller: BlockingCaller,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            compensations,
            caller,
            shutdown,
        })
    }

    pub fn registry(&self) -> &Arc<R> {
        &self.registry
    }

    /// Registers handlers for `Subscribe` and `Unsubscribe` on `events`.
    ///
    /// The queue's handler timeout bounds only the mirrored mutation. A
    /// compensation publish that follows runs under the producer's own
    /// publish timeout, so a slow mutation cannot swallow its compensation.
    pub fn register(self: &Arc<Self>, events: &EventConsumer<SubscriberData>) {
        let budget = events.consumer().config().handler_timeout;
        for event in [SubscriptionEvent::Subscribed, SubscriptionEvent::Unsubscribed] {
            events.on(
                event.as_str(),
                Arc::new(MirrorHandler {
                    mirror: Arc::clone(self),
                    event,
                    budget,
                }),
            );
        }
    }

    /// Applies one subscription event and returns the step it ended on.
    ///
    /// Returns an error only when the apply failed and the compensation
    /// could not be published either.
    pub async fn apply(
        &self,
        event: SubscriptionEvent,
        envelope: &Envelope<SubscriberData>,
    ) -> Result<SagaStep> {
        self.apply_within(event, envelope, None).await
    }

    #[tracing::instrument(
        skip(self, envelope),
        fields(id = %envelope.id, email = %envelope.data.email)
    )]
    async fn apply_within(
        &self,
        event: SubscriptionEvent,
        envelope: &Envelope<SubscriberData>,
        budget: Option<Duration>,
    ) -> Result<SagaStep> {
        let subscriber = Subscriber::new(envelope.data.email.as_str());
        let mutation = Mutation::from(event);
        let started = Instant::now();

        let applied = mutation.apply(&self.caller, &self.shutdown, &self.registry, &subscriber);
        let outcome = match budget {
            Some(budget) => tokio::time::timeout(budget, applied)
                .await
                .unwrap_or(Err(SagaError::DeadlineExceeded(budget))),
            None => applied.await,
        };

        let failure = match outcome {
            Ok(()) => {
                metrics::histogram!("saga_step_duration_seconds", "step" => SagaStep::Applied.as_str())
                    .record(started.elapsed().as_secs_f64());
                tracing::info!(step = %SagaStep::Applied, %mutation, "mirrored mutation applied");
                return Ok(SagaStep::Applied);
            }
            Err(e) => e,
        };

        let Some(compensation) = event.compensation() else {
            tracing::error!(step = %SagaStep::Stuck, %event, "event has no compensation");
            return Err(failure);
        };
        tracing::warn!(%mutation, error = %failure, %compensation, "mirrored mutation failed");

        let request = envelope.clone().relabel(compensation.as_str());
        self.compensations
            .publish(&self.shutdown, &request)
            .await
            .map_err(|e| {
                tracing::error!(step = %SagaStep::Stuck, error = %e, "compensation not published");
                SagaError::Broker(e)
            })?;

        metrics::counter!("compensate_total", "model" => MODEL, "action" => compensation.as_str())
            .increment(1);
        tracing::info!(step = %SagaStep::CompensationPublished, "compensation requested");
        Ok(SagaStep::CompensationPublished)
    }

    pub async fn close(&self) -> Result<()> {
        self.compensations.close().await?;
        Ok(())
    }
}

struct MirrorHandler<R> {
    mirror: Arc<SubscriptionMirror<R>>,
    event: SubscriptionEvent,
    budget: Duration,
}

#[async_trait]
impl<R: SubscriberRegistry> EventHandler<SubscriberData> for MirrorHandler<R> {
    async fn handle(&self, envelope: &Envelope<SubscriberData>) -> broker::Result<()> {
        self.mirror
            .apply_within(self.event, envelope, Some(self.budget))
            .await
            .map(|_| ())
            .map_err(BrokerError::handler)
    }

    fn timeout(&self, _handler_timeout: Duration) -> Option<Duration> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::InMemorySubscriberRegistry;
    use broker::{InMemoryBroker, Producer, QueueConfig, SUBSCRIPTIONS};

    fn mirror(
        broker: &InMemoryBroker,
        registry: &Arc<InMemorySubscriberRegistry>,
    ) -> Arc<SubscriptionMirror<InMemorySubscriberRegistry>> {
        let compensations = EventProducer::new(
            Producer::new(
                Arc::new(broker.clone()),
                QueueConfig::new("memory://", "user_compensate"),
            ),
            SUBSCRIPTIONS,
        );
        SubscriptionMirror::new(
            Arc::clone(registry),
            compensations,
            BlockingCaller::default(),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn test_applied_subscribe_publishes_nothing() {
        let broker = InMemoryBroker::new();
        let registry = Arc::new(InMemorySubscriberRegistry::new());
        let mirror = mirror(&broker, &registry);
        let envelope = Envelope::event("Subscribe", SubscriberData::new("a@x.com"));

        let step = mirror
            .apply(SubscriptionEvent::Subscribed, &envelope)
            .await
            .unwrap();

        assert_eq!(step, SagaStep::Applied);
        assert!(registry.contains("a@x.com"));
        assert_eq!(broker.published_count("user_compensate"), 0);
    }

    #[tokio::test]
    async fn test_duplicate_subscribe_requests_compensation() {
        let broker = InMemoryBroker::new();
        let registry = Arc::new(InMemorySubscriberRegistry::with_subscribers(["a@x.com"]));
        let mirror = mirror(&broker, &registry);
        let envelope = Envelope::event("Subscribe", SubscriberData::new("a@x.com"));

        let step = mirror
            .apply(SubscriptionEvent::Subscribed, &envelope)
            .await
            .unwrap();

        assert_eq!(step, SagaStep::CompensationPublished);
        let published = broker
            .published_envelopes::<SubscriberData>("user_compensate")
            .unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].message_type, "CompensateSubscribe");
        assert_eq!(published[0].id, envelope.id);
        assert_eq!(published[0].data, envelope.data);
    }

    #[tokio::test]
    async fn test_missing_unsubscribe_requests_compensation() {
        let broker = InMemoryBroker::new();
        let registry = Arc::new(InMemorySubscriberRegistry::new());
        let mirror = mirror(&broker, &registry);
        let envelope = Envelope::event("Unsubscribe", SubscriberData::new("a@x.com"));

        let step = mirror
            .apply(SubscriptionEvent::Unsubscribed, &envelope)
            .await
            .unwrap();

        assert_eq!(step, SagaStep::CompensationPublished);
        let published = broker
            .published_envelopes::<SubscriberData>("user_compensate")
            .unwrap();
        assert_eq!(published[0].message_type, "CompensateUnsubscribe");
    }

    #[tokio::test]
    async fn test_unpublishable_compensation_is_an_error() {
        let broker = InMemoryBroker::new();
        let registry = Arc::new(InMemorySubscriberRegistry::new());
        registry.set_fail_on_create(true);
        broker.set_fail_on_publish(true);
        let mirror = mirror(&broker, &registry);
        let envelope = Envelope::event("Subscribe", SubscriberData::new("a@x.com"));

        let result = mirror.apply(SubscriptionEvent::Subscribed, &envelope).await;

        assert!(matches!(result, Err(SagaError::Broker(_))));
    }

    #[tokio::test]
    async fn test_register_handles_origin_events_only() {
        let broker = InMemoryBroker::new();
        let registry = Arc::new(InMemorySubscriberRegistry::new());
        let consumer = broker::Consumer::new(
            Arc::new(broker.clone()),
            QueueConfig::new("memory://", "user"),
        )
        .await
        .unwrap();
        let events = EventConsumer::new(Arc::new(consumer), SUBSCRIPTIONS);

        mirror(&broker, &registry).register(&events);

        assert!(events.handles("Subscribe"));
        assert!(events.handles("Unsubscribe"));
        assert!(!events.handles("CompensateSubscribe"));
    }
}
