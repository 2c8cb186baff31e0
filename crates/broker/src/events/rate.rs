//! Rate-fetched facts. Append-only, never compensated.

use chrono::{DateTime, Utc};
use common::{EventId, Rate};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::adapter::{EventProducer, Family};
use crate::envelope::EnvelopeKind;
use crate::error::Result;

pub const RATES: Family = Family {
    name: "rate",
    kind: EnvelopeKind::Event,
};

pub const RATE_FETCHED: &str = "RateFetched";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateData {
    pub from: String,
    pub to: String,
    #[serde(rename = "body")]
    pub rate: f64,
    pub time: DateTime<Utc>,
}

impl From<&Rate> for RateData {
    fn from(rate: &Rate) -> Self {
        Self {
            from: rate.from.clone(),
            to: rate.to.clone(),
            rate: rate.rate,
            time: rate.time,
        }
    }
}

impl From<RateData> for Rate {
    fn from(data: RateData) -> Self {
        Rate {
            from: data.from,
            to: data.to,
            rate: data.rate,
            time: data.time,
        }
    }
}

impl EventProducer<RateData> {
    /// Publishes a `RateFetched` fact.
    pub async fn send_rate(&self, cancel: &CancellationToken, rate: &Rate) -> Result<EventId> {
        self.send(cancel, RATE_FETCHED, RateData::from(rate)).await
    }
}
