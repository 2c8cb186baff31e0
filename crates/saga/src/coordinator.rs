//! Origin side of the subscription saga.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use broker::{
    Envelope, EventConsumer, EventHandler, EventProducer, SubscriberData, SubscriptionEvent,
};
use common::{BlockingCaller, EventId, Subscriber};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, SagaError};
use crate::mutation::Mutation;
use crate::registry::SubscriberRegistry;
use crate::step::SagaStep;

const MODEL: &str = "subscriber";

/// Wraps the origin registry and pairs every mutation with an event.
///
/// There is no distributed transaction. A mutation commits locally first
/// and is then announced; the downstream mirror either applies it or asks
/// for it to be undone with a compensation event, which this coordinator
/// listens for from construction onwards.
pub struct SubscriberSaga<R> {
    registry: Arc<R>,
    events: EventProducer<SubscriberData>,
    caller: BlockingCaller,
    shutdown: CancellationToken,
}

impl<R: SubscriberRegistry> SubscriberSaga<R> {
    /// Creates the coordinator and registers its compensation handlers on
    /// `compensations`.
    pub fn new(
        registry: Arc<R>,
        events: EventProducer<SubscriberData>,
        compensations: &EventConsumer<SubscriberData>,
        caller: BlockingCaller,
    ) -> Self {
        let shutdown = CancellationToken::new();
        for event in [
            SubscriptionEvent::CompensateSubscribed,
            SubscriptionEvent::CompensateUnsubscribed,
        ] {
            compensations.on(
                event.as_str(),
                Arc::new(CompensationHandler {
                    registry: Arc::clone(&registry),
                    caller: caller.clone(),
                    event,
                    shutdown: shutdown.clone(),
                }),
            );
        }

        Self {
            registry,
            events,
            caller,
            shutdown,
        }
    }

    pub fn registry(&self) -> &Arc<R> {
        &self.registry
    }

    /// Stores a subscriber, then publishes `Subscribe`.
    ///
    /// A registry failure publishes nothing. A publish failure returns
    /// [`SagaError::NotificationFailed`] and leaves the row in place.
    #[tracing::instrument(skip(self, cancel), fields(email = %subscriber.email))]
    pub async fn create(&self, cancel: &CancellationToken, subscriber: &Subscriber) -> Result<EventId> {
        self.mutate(cancel, SubscriptionEvent::Subscribed, subscriber)
            .await
    }

    /// Removes a subscriber, then publishes `Unsubscribe`.
    #[tracing::instrument(skip(self, cancel), fields(email = %subscriber.email))]
    pub async fn delete(&self, cancel: &CancellationToken, subscriber: &Subscriber) -> Result<EventId> {
        self.mutate(cancel, SubscriptionEvent::Unsubscribed, subscriber)
            .await
    }

    /// Reads straight through to the registry.
    pub async fn exists(&self, cancel: &CancellationToken, subscriber: &Subscriber) -> Result<bool> {
        let registry = Arc::clone(&self.registry);
        let subscriber = subscriber.clone();
        Ok(self
            .caller
            .call(cancel, move || registry.exists(&subscriber))
            .await?)
    }

    pub async fn find_all(&self, cancel: &CancellationToken) -> Result<Vec<Subscriber>> {
        let registry = Arc::clone(&self.registry);
        Ok(self.caller.call(cancel, move || registry.find_all()).await?)
    }

    async fn mutate(
        &self,
        cancel: &CancellationToken,
        event: SubscriptionEvent,
        subscriber: &Subscriber,
    ) -> Result<EventId> {
        let mutation = Mutation::from(event);
        let started = Instant::now();

        mutation
            .apply(&self.caller, cancel, &self.registry, subscriber)
            .await?;
        record_step(SagaStep::Committed, started);
        metrics::counter!("saga_total", "model" => MODEL, "action" => mutation.as_str()).increment(1);

        let published = Instant::now();
        let id = self
            .events
            .send_subscription(cancel, event, &subscriber.email)
            .await
            .map_err(|source| {
                tracing::error!(
                    step = %SagaStep::Stuck,
                    error = %source,
                    "mutation committed but event not published"
                );
                SagaError::NotificationFailed {
                    email: subscriber.email.clone(),
                    source,
                }
            })?;
        record_step(SagaStep::Published, published);
        tracing::info!(step = %SagaStep::Published, %id, %event, "subscription event published");

        Ok(id)
    }

    /// Cancels in-flight compensation calls and closes the event producer.
    pub async fn close(&self) -> Result<()> {
        self.shutdown.cancel();
        self.events.close().await?;
        Ok(())
    }
}

fn record_step(step: SagaStep, started: Instant) {
    metrics::histogram!("saga_step_duration_seconds", "step" => step.as_str())
        .record(started.elapsed().as_secs_f64());
}

/// Undoes an origin mutation the downstream mirror failed to apply.
///
/// A failure here is terminal: it is logged and nothing is re-published.
struct CompensationHandler<R> {
    registry: Arc<R>,
    caller: BlockingCaller,
    event: SubscriptionEvent,
    shutdown: CancellationToken,
}

#[async_trait]
impl<R: SubscriberRegistry> EventHandler<SubscriberData> for CompensationHandler<R> {
    async fn handle(&self, envelope: &Envelope<SubscriberData>) -> broker::Result<()> {
        let subscriber = Subscriber::new(envelope.data.email.as_str());
        let mutation = Mutation::from(self.event);
        let started = Instant::now();

        match mutation
            .apply(&self.caller, &self.shutdown, &self.registry, &subscriber)
            .await
        {
            Ok(()) => {
                record_step(SagaStep::Compensated, started);
                metrics::counter!(
                    "compensate_total",
                    "model" => MODEL,
                    "action" => self.event.as_str()
                )
                .increment(1);
                tracing::info!(
                    step = %SagaStep::Compensated,
                    id = %envelope.id,
                    email = %subscriber.email,
                    %mutation,
                    "origin mutation compensated"
                );
            }
            Err(e) => {
                tracing::error!(
                    step = %SagaStep::Stuck,
                    id = %envelope.id,
                    email = %subscriber.email,
                    %mutation,
                    error = %e,
                    "compensation failed"
                );
            }
        }
        Ok(())
    }
}
