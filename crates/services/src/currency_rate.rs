//! The origin service: subscriber registry, saga coordinator, rate job.

use std::sync::Arc;

use broker::{EventConsumer, EventProducer, RATES, SUBSCRIPTIONS, SubscriberData};
use rates::{FallbackRateSource, RateJob, RateSource, StaticRateSource};
use saga::{InMemorySubscriberRegistry, SubscriberSaga};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ServiceConfig;
use crate::error::Result;
use crate::transport::Transport;

/// Running pieces of the currency-rate service.
///
/// Subscription requests enter through [`CurrencyRateService::saga`].
pub struct CurrencyRateService {
    saga: Arc<SubscriberSaga<InMemorySubscriberRegistry>>,
    compensations: EventConsumer<SubscriberData>,
    job: Arc<RateJob>,
    config: ServiceConfig,
}

impl CurrencyRateService {
    /// Wires the service; nothing runs until [`CurrencyRateService::start`].
    pub async fn build(
        config: ServiceConfig,
        transport: &Transport,
        source: Arc<dyn RateSource>,
    ) -> Result<Self> {
        let broker_config = &config.broker;
        let caller = config.blocking_caller();

        let subscription_events = EventProducer::new(
            transport
                .producer(broker_config.queue(&broker_config.user_queue))
                .await?,
            SUBSCRIPTIONS,
        );
        let compensations = EventConsumer::new(
            transport
                .consumer(broker_config.queue(&broker_config.user_compensate_queue))
                .await?,
            SUBSCRIPTIONS,
        );
        let saga = SubscriberSaga::new(
            Arc::new(InMemorySubscriberRegistry::new()),
            subscription_events,
            &compensations,
            caller,
        );

        let rate_events = EventProducer::new(
            transport
                .producer(broker_config.queue(&broker_config.rate_queue))
                .await?,
            RATES,
        );
        let job = RateJob::new(source, rate_events, "USD", "UAH");

        Ok(Self {
            saga: Arc::new(saga),
            compensations,
            job: Arc::new(job),
            config,
        })
    }

    /// Builds the rate source chain from configuration.
    pub fn rate_source(config: &ServiceConfig) -> Result<Arc<dyn RateSource>> {
        let quote = config.require_static_rate()?;
        let chain = FallbackRateSource::new()
            .then(Arc::new(StaticRateSource::new("static").with_rate("USD", "UAH", quote)));
        Ok(Arc::new(chain))
    }

    pub fn saga(&self) -> &Arc<SubscriberSaga<InMemorySubscriberRegistry>> {
        &self.saga
    }

    pub fn job(&self) -> &Arc<RateJob> {
        &self.job
    }

    /// Starts the compensation listener and the periodic rate job.
    pub fn start(&self, shutdown: &CancellationToken) -> Vec<JoinHandle<()>> {
        tracing::info!(
            refresh = ?self.config.rate_refresh_interval,
            "starting currency-rate service"
        );
        vec![
            self.compensations.start(shutdown.clone()),
            Arc::clone(&self.job).spawn(self.config.rate_refresh_interval, shutdown.clone()),
        ]
    }

    /// Closes every broker connection the service holds.
    pub async fn close(&self) -> Result<()> {
        self.saga.close().await?;
        self.compensations.close().await?;
        self.job.close().await?;
        Ok(())
    }
}
