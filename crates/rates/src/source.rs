//! Rate sources and the fallback chain over them.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::Rate;

use crate::error::{RatesError, Result};

/// Anything that can quote an exchange rate for a currency pair.
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Name used in log records and errors.
    fn name(&self) -> &str;

    async fn fetch_rate(&self, from: &str, to: &str) -> Result<Rate>;
}

/// A source serving fixed rates, stamped with the current time.
#[derive(Debug, Clone)]
pub struct StaticRateSource {
    name: String,
    rates: HashMap<(String, String), f64>,
}

impl StaticRateSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rates: HashMap::new(),
        }
    }

    /// Adds a quote for `from` -> `to`.
    pub fn with_rate(mut self, from: &str, to: &str, rate: f64) -> Self {
        self.rates.insert((from.to_string(), to.to_string()), rate);
        self
    }
}

#[async_trait]
impl RateSource for StaticRateSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_rate(&self, from: &str, to: &str) -> Result<Rate> {
        self.rates
            .get(&(from.to_string(), to.to_string()))
            .map(|&rate| Rate::new(from, to, rate))
            .ok_or_else(|| RatesError::source_failed(&self.name, format!("no quote for {from}-{to}")))
    }
}

/// Tries each source in order and returns the first quote.
///
/// When every source fails the error lists each failure in order.
#[derive(Clone, Default)]
pub struct FallbackRateSource {
    sources: Vec<Arc<dyn RateSource>>,
}

impl FallbackRateSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a source to the end of the chain.
    pub fn then(mut self, source: Arc<dyn RateSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[async_trait]
impl RateSource for FallbackRateSource {
    fn name(&self) -> &str {
        "fallback"
    }

    async fn fetch_rate(&self, from: &str, to: &str) -> Result<Rate> {
        let mut failures = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            match source.fetch_rate(from, to).await {
                Ok(rate) => {
                    tracing::debug!(source = source.name(), from, to, rate = rate.rate, "rate fetched");
                    return Ok(rate);
                }
                Err(e) => {
                    tracing::warn!(source = source.name(), error = %e, "rate source failed, trying next");
                    failures.push(e.to_string());
                }
            }
        }
        Err(RatesError::Exhausted(failures))
    }
}
