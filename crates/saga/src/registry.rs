//! Subscriber registry trait and in-memory implementation.
//!
//! Each service owns its own registry; nothing is shared between the
//! origin and the downstream mirror except the events that keep them in
//! step.

use std::collections::BTreeSet;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use common::Subscriber;
use thiserror::Error;

/// Errors returned by a subscriber registry backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The email address is already registered.
    #[error("Subscriber already exists: {0}")]
    AlreadyExists(String),

    /// The email address is not registered.
    #[error("Subscriber not found: {0}")]
    NotFound(String),

    /// The backend could not serve the request.
    #[error("Registry unavailable: {0}")]
    Unavailable(String),
}

/// Storage of subscribers keyed by email address.
///
/// Calls are synchronous and not cancellation-aware; callers bound them with
/// a [`common::BlockingCaller`].
pub trait SubscriberRegistry: Send + Sync + 'static {
    /// Inserts a subscriber. Fails if the email is already present.
    fn create(&self, subscriber: &Subscriber) -> Result<(), RegistryError>;

    /// Removes a subscriber. Fails if the email is absent.
    fn delete(&self, subscriber: &Subscriber) -> Result<(), RegistryError>;

    fn exists(&self, subscriber: &Subscriber) -> Result<bool, RegistryError>;

    fn find_all(&self) -> Result<Vec<Subscriber>, RegistryError>;
}

#[derive(Debug, Default)]
struct InMemoryRegistryState {
    subscribers: BTreeSet<Subscriber>,
    fail_on_create: bool,
    fail_on_delete: bool,
}

/// In-memory subscriber registry.
#[derive(Debug, Clone, Default)]
pub struct InMemorySubscriberRegistry {
    state: Arc<RwLock<InMemoryRegistryState>>,
}

impl InMemorySubscriberRegistry {
    /// Creates a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry pre-populated with the given emails.
    pub fn with_subscribers<'a>(emails: impl IntoIterator<Item = &'a str>) -> Self {
        let registry = Self::new();
        registry.write().subscribers = emails.into_iter().map(Subscriber::new).collect();
        registry
    }

    fn read(&self) -> RwLockReadGuard<'_, InMemoryRegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, InMemoryRegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Configures every subsequent create to fail as unavailable.
    pub fn set_fail_on_create(&self, fail: bool) {
        self.write().fail_on_create = fail;
    }

    /// Configures every subsequent delete to fail as unavailable.
    pub fn set_fail_on_delete(&self, fail: bool) {
        self.write().fail_on_delete = fail;
    }

    /// Returns the number of registered subscribers.
    pub fn len(&self) -> usize {
        self.read().subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().subscribers.is_empty()
    }

    /// Returns true if the email is registered.
    pub fn contains(&self, email: &str) -> bool {
        self.read().subscribers.contains(&Subscriber::new(email))
    }
}

impl SubscriberRegistry for InMemorySubscriberRegistry {
    fn create(&self, subscriber: &Subscriber) -> Result<(), RegistryError> {
        let mut state = self.write();
        if state.fail_on_create {
            return Err(RegistryError::Unavailable("insert rejected".to_string()));
        }
        if !state.subscribers.insert(subscriber.clone()) {
            return Err(RegistryError::AlreadyExists(subscriber.email.clone()));
        }
        Ok(())
    }

    fn delete(&self, subscriber: &Subscriber) -> Result<(), RegistryError> {
        let mut state = self.write();
        if state.fail_on_delete {
            return Err(RegistryError::Unavailable("delete rejected".to_string()));
        }
        if !state.subscribers.remove(subscriber) {
            return Err(RegistryError::NotFound(subscriber.email.clone()));
        }
        Ok(())
    }

    fn exists(&self, subscriber: &Subscriber) -> Result<bool, RegistryError> {
        Ok(self.read().subscribers.contains(subscriber))
    }

    fn find_all(&self) -> Result<Vec<Subscriber>, RegistryError> {
        Ok(self.read().subscribers.iter().cloned().collect())
    }
}
