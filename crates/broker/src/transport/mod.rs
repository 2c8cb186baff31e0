//! At-least-once delivery of opaque byte payloads over named queues.
//!
//! A [`Broker`] is one connection to a message broker. A [`Producer`] owns a
//! connection and publishes to one queue; a [`Consumer`] owns a connection,
//! binds to one queue and fans every delivery out to all registered
//! [`Listener`]s.

pub mod consumer;
pub mod memory;
pub mod nats;
pub mod producer;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;

use crate::Result;

pub use consumer::{Consumer, Listener};
pub use memory::InMemoryBroker;
pub use nats::NatsBroker;
pub use producer::Producer;

/// Stream of raw message bodies delivered from one queue. Ends when the
/// connection closes.
pub type Deliveries = BoxStream<'static, Bytes>;

/// A connection to a message broker.
///
/// Implementations deliver each message on a queue to one of the streams
/// bound to it; several streams bound to the same queue compete for
/// messages.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Publishes a payload to a named queue, returning once the broker has
    /// accepted it.
    async fn publish(&self, queue: &str, payload: Bytes) -> Result<()>;

    /// Binds to a named queue and returns its deliveries.
    async fn subscribe(&self, queue: &str) -> Result<Deliveries>;

    /// Tears down the connection.
    async fn close(&self) -> Result<()>;
}
