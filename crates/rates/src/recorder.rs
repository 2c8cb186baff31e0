//! Downstream consumer of `RateFetched` facts.

use std::sync::Arc;

use async_trait::async_trait;
use broker::{BrokerError, Envelope, EventConsumer, EventHandler, RATE_FETCHED, RateData};
use common::{BlockingCaller, Rate};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::store::RateRepository;

/// Appends every fetched rate to the rate history.
pub struct RateRecorder<S> {
    repository: Arc<S>,
    caller: BlockingCaller,
    shutdown: CancellationToken,
}

impl<S: RateRepository> RateRecorder<S> {
    pub fn new(repository: Arc<S>, caller: BlockingCaller, shutdown: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            repository,
            caller,
            shutdown,
        })
    }

    /// Registers the recorder for `RateFetched` on `events`.
    pub fn register(self: &Arc<Self>, events: &EventConsumer<RateData>) {
        events.on(RATE_FETCHED, Arc::clone(self) as Arc<dyn EventHandler<RateData>>);
    }

    /// Stores one rate.
    pub async fn record(&self, rate: Rate) -> Result<()> {
        tracing::info!(from = %rate.from, to = %rate.to, rate = rate.rate, time = %rate.time, "rate fetched");
        let repository = Arc::clone(&self.repository);
        self.caller
            .call(&self.shutdown, move || repository.create(&rate))
            .await?;
        tracing::debug!("rate saved");
        Ok(())
    }
}

#[async_trait]
impl<S: RateRepository> EventHandler<RateData> for RateRecorder<S> {
    async fn handle(&self, envelope: &Envelope<RateData>) -> broker::Result<()> {
        self.record(Rate::from(envelope.data.clone()))
            .await
            .map_err(BrokerError::handler)
    }
}
