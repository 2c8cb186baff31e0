//! Broker connections for the services.

use std::sync::Arc;

use broker::{Broker, Consumer, InMemoryBroker, NatsBroker, Producer, QueueConfig};

/// Scheme selecting the in-process broker.
pub const MEMORY_SCHEME: &str = "memory://";

/// How producers and consumers obtain their broker connection.
#[derive(Clone)]
pub enum Transport {
    /// Every producer and consumer dials its own NATS connection.
    Nats,
    /// Every producer and consumer shares one existing broker. Built from
    /// `memory://`, that broker is private to the process.
    Shared(Arc<dyn Broker>),
}

impl Transport {
    /// Picks a transport from the broker URI.
    ///
    /// `memory://` creates a broker private to this process. Two services
    /// only talk over it when they run in the same process and share the
    /// returned transport.
    pub fn from_uri(uri: &str) -> Self {
        if uri.starts_with(MEMORY_SCHEME) {
            tracing::warn!(
                uri,
                "in-process broker selected; messages never leave this process"
            );
            Transport::Shared(Arc::new(InMemoryBroker::new()))
        } else {
            Transport::Nats
        }
    }

    /// Returns a connection for one producer or consumer.
    pub async fn connect(&self, uri: &str) -> broker::Result<Arc<dyn Broker>> {
        match self {
            Transport::Nats => Ok(Arc::new(NatsBroker::connect(uri).await?)),
            Transport::Shared(broker) => Ok(Arc::clone(broker)),
        }
    }

    /// Connects a producer for `config`'s queue.
    pub async fn producer(&self, config: QueueConfig) -> broker::Result<Producer> {
        Ok(Producer::new(self.connect(&config.broker_uri).await?, config))
    }

    /// Connects a consumer bound to `config`'s queue.
    pub async fn consumer(&self, config: QueueConfig) -> broker::Result<Arc<Consumer>> {
        let broker = self.connect(&config.broker_uri).await?;
        Ok(Arc::new(Consumer::new(broker, config).await?))
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transport::Nats => f.write_str("Nats"),
            Transport::Shared(_) => f.write_str("Shared"),
        }
    }
}
