//! Choreographed subscription saga.
//!
//! The origin service and the downstream service each keep their own copy
//! of "is this email subscribed". No component holds global saga state;
//! each side reacts to the message it receives:
//!
//! 1. [`SubscriberSaga`] commits to the origin registry, then publishes
//!    `Subscribe` / `Unsubscribe`.
//! 2. [`SubscriptionMirror`] applies the mutation downstream. On failure it
//!    publishes `CompensateSubscribe` / `CompensateUnsubscribe`.
//! 3. [`SubscriberSaga`] receives the compensation and undoes its mutation.
//!
//! A message lost between hops leaves the two sides divergent; nothing
//! detects or repairs that.

pub mod compensating;
pub mod coordinator;
pub mod error;
pub mod mutation;
pub mod registry;
pub mod step;

pub use compensating::SubscriptionMirror;
pub use coordinator::SubscriberSaga;
pub use error::{Result, SagaError};
pub use mutation::Mutation;
pub use registry::{InMemorySubscriberRegistry, RegistryError, SubscriberRegistry};
pub use step::SagaStep;
