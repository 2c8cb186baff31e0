//! Wiring for the two services of the currency-rate platform.
//!
//! - [`CurrencyRateService`] owns the live subscriber registry, pairs each
//!   registry write with a subscription event, and publishes fetched rates.
//! - [`EmailService`] mirrors subscribers, records rates, and mails the
//!   latest rate to every subscriber on a schedule.
//!
//! Both read a [`ServiceConfig`] from the environment and talk over the
//! broker chosen by [`Transport`].

pub mod config;
pub mod currency_rate;
pub mod email_service;
pub mod error;
pub mod shutdown;
pub mod telemetry;
pub mod transport;

pub use config::{BrokerConfig, ConfigError, ServiceConfig};
pub use currency_rate::CurrencyRateService;
pub use email_service::EmailService;
pub use error::{Result, ServiceError};
pub use transport::Transport;
