//! Service bootstrap errors.

use broker::BrokerError;
use rates::RatesError;
use saga::SagaError;
use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Saga error: {0}")]
    Saga(#[from] SagaError),

    #[error("Rates error: {0}")]
    Rates(#[from] RatesError),
}

pub type Result<T> = std::result::Result<T, ServiceError>;
