//! Periodic rate mailing to every subscriber.

use std::sync::Arc;

use common::{BlockingCaller, Rate};
use saga::SubscriberRegistry;
use tokio_util::sync::CancellationToken;

use crate::error::{RatesError, Result};
use crate::mail::EmailSender;
use crate::store::RateRepository;

/// Plain-text rendering of a rate.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainRateMessage;

impl PlainRateMessage {
    /// e.g. `USD-UAH exchange rate`
    pub fn subject(&self, rate: &Rate) -> String {
        format!("{}-{} exchange rate", rate.from, rate.to)
    }

    /// e.g. `1 USD = 41.250000 UAH`
    pub fn body(&self, rate: &Rate) -> String {
        format!("1 {} = {:.6} {}", rate.from, rate.rate, rate.to)
    }
}

/// Mails the latest stored rate for one pair to all subscribers.
pub struct MailNotifier<S, R> {
    sender: Arc<dyn EmailSender>,
    rates: Arc<S>,
    subscribers: Arc<R>,
    caller: BlockingCaller,
    message: PlainRateMessage,
    from: String,
    to: String,
}

impl<S: RateRepository, R: SubscriberRegistry> MailNotifier<S, R> {
    /// Creates a notifier for the USD to UAH rate.
    pub fn new(
        sender: Arc<dyn EmailSender>,
        rates: Arc<S>,
        subscribers: Arc<R>,
        caller: BlockingCaller,
    ) -> Self {
        Self {
            sender,
            rates,
            subscribers,
            caller,
            message: PlainRateMessage,
            from: "USD".to_string(),
            to: "UAH".to_string(),
        }
    }

    /// Mails a different pair.
    pub fn for_pair(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.from = from.into();
        self.to = to.into();
        self
    }

    /// Sends one email to every subscriber and returns the recipient count.
    ///
    /// Sends nothing when there are no subscribers. Fails when no rate has
    /// been stored for the pair.
    #[tracing::instrument(skip(self, cancel), fields(from = %self.from, to = %self.to))]
    pub async fn notify(&self, cancel: &CancellationToken) -> Result<usize> {
        match self.send(cancel).await {
            Ok(recipients) => {
                if recipients > 0 {
                    metrics::counter!("notifications_sent_total").increment(1);
                }
                Ok(recipients)
            }
            Err(e) => {
                metrics::counter!("notifications_failed_total").increment(1);
                tracing::error!(error = %e, "notifying subscribers failed");
                Err(e)
            }
        }
    }

    async fn send(&self, cancel: &CancellationToken) -> Result<usize> {
        let rates = Arc::clone(&self.rates);
        let (from, to) = (self.from.clone(), self.to.clone());
        let rate = self
            .caller
            .call(cancel, move || rates.latest(&from, &to))
            .await?
            .ok_or_else(|| RatesError::NoRate {
                from: self.from.clone(),
                to: self.to.clone(),
            })?;
        tracing::debug!(rate = rate.rate, time = %rate.time, "latest rate loaded");

        let subscribers = Arc::clone(&self.subscribers);
        let emails: Vec<String> = self
            .caller
            .call(cancel, move || subscribers.find_all())
            .await?
            .into_iter()
            .map(|subscriber| subscriber.email)
            .collect();
        if emails.is_empty() {
            tracing::info!("no subscribers to notify");
            return Ok(0);
        }

        tracing::info!(subscribers = emails.len(), "notifying subscribers by email");
        self.sender
            .send_email(
                cancel,
                &emails,
                &self.message.subject(&rate),
                &self.message.body(&rate),
            )
            .await?;
        Ok(emails.len())
    }
}
