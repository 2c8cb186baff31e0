//! Fetch-and-publish job for one currency pair.

use std::sync::Arc;
use std::time::Duration;

use broker::{EventProducer, RateData};
use common::Rate;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{RatesError, Result};
use crate::schedule;
use crate::source::RateSource;

/// Fetches a rate for one pair and publishes it as `RateFetched`.
pub struct RateJob {
    source: Arc<dyn RateSource>,
    events: EventProducer<RateData>,
    from: String,
    to: String,
    timeout: Duration,
}

impl RateJob {
    /// Default bound on one fetch.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(
        source: Arc<dyn RateSource>,
        events: EventProducer<RateData>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        Self {
            source,
            events,
            from: from.into(),
            to: to.into(),
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Runs the job once and returns the published rate.
    #[tracing::instrument(skip(self, cancel), fields(from = %self.from, to = %self.to))]
    pub async fn run(&self, cancel: &CancellationToken) -> Result<Rate> {
        tracing::debug!("rate job triggered");
        let fetch = self.source.fetch_rate(&self.from, &self.to);
        let rate = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(RatesError::Cancelled),
            fetched = tokio::time::timeout(self.timeout, fetch) => {
                fetched.map_err(|_| RatesError::DeadlineExceeded(self.timeout))??
            }
        };
        tracing::debug!(rate = rate.rate, "rate fetched");

        self.events.send_rate(cancel, &rate).await?;
        tracing::info!(rate = rate.rate, "rate published");
        Ok(rate)
    }

    pub async fn close(&self) -> Result<()> {
        self.events.close().await?;
        Ok(())
    }

    /// Runs the job now and then every `period` until `shutdown` fires.
    pub fn spawn(self: Arc<Self>, period: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = self.run(&shutdown).await {
                tracing::error!(error = %e, "initial rate fetch failed");
            }
            let job = Arc::clone(&self);
            let cancel = shutdown.clone();
            let schedule = schedule::every("rate-job", period, shutdown, move || {
                let job = Arc::clone(&job);
                let cancel = cancel.clone();
                async move { job.run(&cancel).await.map(|_| ()) }
            });
            if let Err(e) = schedule.await {
                tracing::error!(error = %e, "rate job schedule panicked");
            }
        })
    }
}
