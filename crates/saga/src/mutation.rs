//! Registry mutations carried by subscription events.

use std::sync::Arc;

use broker::SubscriptionEvent;
use common::{BlockingCaller, Subscriber};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::registry::{RegistryError, SubscriberRegistry};

/// A single write against a subscriber registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mutation {
    Create,
    Delete,
}

impl Mutation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mutation::Create => "create",
            Mutation::Delete => "delete",
        }
    }

    /// Returns the mutation that undoes this one.
    pub fn inverse(&self) -> Mutation {
        match self {
            Mutation::Create => Mutation::Delete,
            Mutation::Delete => Mutation::Create,
        }
    }

    fn run<R: SubscriberRegistry>(
        self,
        registry: &R,
        subscriber: &Subscriber,
    ) -> std::result::Result<(), RegistryError> {
        match self {
            Mutation::Create => registry.create(subscriber),
            Mutation::Delete => registry.delete(subscriber),
        }
    }

    /// Applies the mutation on the blocking pool under `caller`'s deadline.
    pub async fn apply<R: SubscriberRegistry>(
        self,
        caller: &BlockingCaller,
        cancel: &CancellationToken,
        registry: &Arc<R>,
        subscriber: &Subscriber,
    ) -> Result<()> {
        let registry = Arc::clone(registry);
        let subscriber = subscriber.clone();
        caller
            .call(cancel, move || self.run(registry.as_ref(), &subscriber))
            .await?;
        Ok(())
    }
}

impl std::fmt::Display for Mutation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<SubscriptionEvent> for Mutation {
    /// Maps an event to the write its receiver performs.
    fn from(event: SubscriptionEvent) -> Self {
        match event {
            SubscriptionEvent::Subscribed | SubscriptionEvent::CompensateUnsubscribed => {
                Mutation::Create
            }
            SubscriptionEvent::Unsubscribed | SubscriptionEvent::CompensateSubscribed => {
                Mutation::Delete
            }
        }
    }
}
