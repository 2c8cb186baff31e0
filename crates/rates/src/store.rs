//! Rate history.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use common::Rate;

use crate::error::{RatesError, Result};

/// Append-only storage of observed rates.
///
/// Calls are synchronous; callers bound them with a
/// [`common::BlockingCaller`].
pub trait RateRepository: Send + Sync + 'static {
    fn create(&self, rate: &Rate) -> Result<()>;

    /// Returns the most recent rate for the pair, if any.
    fn latest(&self, from: &str, to: &str) -> Result<Option<Rate>>;
}

#[derive(Debug, Default)]
struct InMemoryRateState {
    rates: Vec<Rate>,
    fail_on_create: bool,
}

/// In-memory rate history.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRateRepository {
    state: Arc<RwLock<InMemoryRateState>>,
}

impl InMemoryRateRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, InMemoryRateState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, InMemoryRateState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Configures every subsequent create to fail.
    pub fn set_fail_on_create(&self, fail: bool) {
        self.write().fail_on_create = fail;
    }

    /// Returns the number of stored rates.
    pub fn len(&self) -> usize {
        self.read().rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().rates.is_empty()
    }
}

impl RateRepository for InMemoryRateRepository {
    fn create(&self, rate: &Rate) -> Result<()> {
        let mut state = self.write();
        if state.fail_on_create {
            return Err(RatesError::Repository("insert rejected".to_string()));
        }
        state.rates.push(rate.clone());
        Ok(())
    }

    fn latest(&self, from: &str, to: &str) -> Result<Option<Rate>> {
        // On equal timestamps the later insert wins.
        Ok(self
            .read()
            .rates
            .iter()
            .filter(|rate| rate.is_pair(from, to))
            .max_by_key(|rate| rate.time)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn rate_at(from: &str, to: &str, value: f64, minutes_ago: i64) -> Rate {
        Rate {
            from: from.to_string(),
            to: to.to_string(),
            rate: value,
            time: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    #[test]
    fn test_latest_picks_newest_for_pair() {
        let repo = InMemoryRateRepository::new();
        repo.create(&rate_at("USD", "UAH", 40.0, 10)).unwrap();
        repo.create(&rate_at("USD", "UAH", 41.0, 1)).unwrap();
        repo.create(&rate_at("EUR", "UAH", 45.0, 0)).unwrap();
        repo.create(&rate_at("USD", "UAH", 39.0, 30)).unwrap();

        let latest = repo.latest("USD", "UAH").unwrap().unwrap();
        assert_eq!(latest.rate, 41.0);
        assert_eq!(repo.len(), 4);
    }

    #[test]
    fn test_latest_of_unknown_pair_is_none() {
        let repo = InMemoryRateRepository::new();
        repo.create(&rate_at("EUR", "UAH", 45.0, 0)).unwrap();

        assert!(repo.latest("USD", "UAH").unwrap().is_none());
    }

    #[test]
    fn test_fail_on_create() {
        let repo = InMemoryRateRepository::new();
        repo.set_fail_on_create(true);

        assert!(matches!(
            repo.create(&rate_at("USD", "UAH", 41.0, 0)),
            Err(RatesError::Repository(_))
        ));
        assert!(repo.is_empty());
    }
}
