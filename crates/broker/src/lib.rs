//! Message broker plumbing shared by both services.
//!
//! - [`transport`]: at-least-once delivery of opaque byte payloads over named
//!   queues ([`Producer`], [`Consumer`]) on top of a pluggable [`Broker`].
//! - [`envelope`]: the JSON wire schema wrapping every event and command.
//! - [`adapter`]: typed producers and consumers that stamp, encode, decode
//!   and dispatch envelopes by event type.
//! - [`events`]: the event families carried by the platform (subscriptions,
//!   rate facts, mail commands).

pub mod adapter;
pub mod config;
pub mod envelope;
pub mod error;
pub mod events;
pub mod transport;

pub use adapter::{EventConsumer, EventHandler, EventProducer, Family};
pub use config::QueueConfig;
pub use envelope::{Envelope, EnvelopeKind};
pub use error::{BrokerError, Result};
pub use events::{
    MAIL, MailData, RATE_FETCHED, RATES, RateData, SEND_EMAIL, SUBSCRIPTIONS, SubscriberData,
    SubscriptionEvent,
};
pub use transport::{
    Broker, Consumer, Deliveries, InMemoryBroker, Listener, NatsBroker, Producer,
};
