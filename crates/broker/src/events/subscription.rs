//! Subscription events and their compensations.

use std::fmt;
use std::str::FromStr;

use common::EventId;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::adapter::{EventProducer, Family};
use crate::envelope::EnvelopeKind;
use crate::error::{BrokerError, Result};

pub const SUBSCRIPTIONS: Family = Family {
    name: "subscription",
    kind: EnvelopeKind::Event,
};

/// Payload shared by every subscription event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberData {
    pub email: String,
}

impl SubscriberData {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
        }
    }
}

/// Subscription message types.
///
/// `Subscribed` and `Unsubscribed` come from the origin and mean "apply this
/// mutation downstream". The compensate variants come from downstream and
/// mean "undo the corresponding mutation at the origin".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionEvent {
    Subscribed,
    Unsubscribed,
    CompensateSubscribed,
    CompensateUnsubscribed,
}

impl SubscriptionEvent {
    pub const ALL: [SubscriptionEvent; 4] = [
        SubscriptionEvent::Subscribed,
        SubscriptionEvent::Unsubscribed,
        SubscriptionEvent::CompensateSubscribed,
        SubscriptionEvent::CompensateUnsubscribed,
    ];

    /// Returns the wire name carried in `eventType`.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionEvent::Subscribed => "Subscribe",
            SubscriptionEvent::Unsubscribed => "Unsubscribe",
            SubscriptionEvent::CompensateSubscribed => "CompensateSubscribe",
            SubscriptionEvent::CompensateUnsubscribed => "CompensateUnsubscribe",
        }
    }

    /// Returns the event that undoes this one, if it can be compensated.
    pub fn compensation(&self) -> Option<SubscriptionEvent> {
        match self {
            SubscriptionEvent::Subscribed => Some(SubscriptionEvent::CompensateSubscribed),
            SubscriptionEvent::Unsubscribed => Some(SubscriptionEvent::CompensateUnsubscribed),
            _ => None,
        }
    }

    pub fn is_compensation(&self) -> bool {
        matches!(
            self,
            SubscriptionEvent::CompensateSubscribed | SubscriptionEvent::CompensateUnsubscribed
        )
    }
}

impl fmt::Display for SubscriptionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionEvent {
    type Err = BrokerError;

    fn from_str(s: &str) -> Result<Self> {
        SubscriptionEvent::ALL
            .into_iter()
            .find(|event| event.as_str() == s)
            .ok_or_else(|| BrokerError::InvalidEnvelope(format!("unknown subscription event '{s}'")))
    }
}

impl EventProducer<SubscriberData> {
    /// Publishes a subscription event for `email`.
    pub async fn send_subscription(
        &self,
        cancel: &CancellationToken,
        event: SubscriptionEvent,
        email: &str,
    ) -> Result<EventId> {
        self.send(cancel, event.as_str(), SubscriberData::new(email))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names() {
        assert_eq!(SubscriptionEvent::Subscribed.as_str(), "Subscribe");
        assert_eq!(SubscriptionEvent::Unsubscribed.as_str(), "Unsubscribe");
        assert_eq!(
            SubscriptionEvent::CompensateSubscribed.to_string(),
            "CompensateSubscribe"
        );
        assert_eq!(
            SubscriptionEvent::CompensateUnsubscribed.to_string(),
            "CompensateUnsubscribe"
        );
    }

    #[test]
    fn test_compensation_pairs() {
        assert_eq!(
            SubscriptionEvent::Subscribed.compensation(),
            Some(SubscriptionEvent::CompensateSubscribed)
        );
        assert_eq!(
            SubscriptionEvent::Unsubscribed.compensation(),
            Some(SubscriptionEvent::CompensateUnsubscribed)
        );
        assert_eq!(SubscriptionEvent::CompensateSubscribed.compensation(), None);
        assert!(SubscriptionEvent::CompensateUnsubscribed.is_compensation());
        assert!(!SubscriptionEvent::Subscribed.is_compensation());
    }

    #[test]
    fn test_parse() {
        for event in SubscriptionEvent::ALL {
            assert_eq!(event.as_str().parse::<SubscriptionEvent>().unwrap(), event);
        }
        assert!("Subscribed".parse::<SubscriptionEvent>().is_err());
    }
}
