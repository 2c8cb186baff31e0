//! Service configuration loaded from environment variables.

use std::time::Duration;

use broker::QueueConfig;
use common::BlockingCaller;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Missing required setting {0}")]
    Missing(&'static str),

    #[error("Invalid value '{value}' for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Broker connection and queue names shared by both services.
///
/// Reads:
/// - `BROKER_URI` (required; `memory://` runs on a broker private to the
///   process, so both services must share one process to talk over it)
/// - `USER_QUEUE_NAME` (default `"user"`)
/// - `USER_COMPENSATE_QUEUE_NAME` (default `"user_compensate"`)
/// - `RATE_QUEUE_NAME` (default `"rate"`)
/// - `MAIL_QUEUE_NAME` (default `"mail"`)
/// - `PUBLISH_TIMEOUT_SECS`, `HANDLER_TIMEOUT_SECS` (default `5`)
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerConfig {
    pub broker_uri: String,
    pub user_queue: String,
    pub user_compensate_queue: String,
    pub rate_queue: String,
    pub mail_queue: String,
    pub publish_timeout: Duration,
    pub handler_timeout: Duration,
}

impl BrokerConfig {
    /// Builds the queue config for one of the named queues.
    pub fn queue(&self, queue_name: &str) -> QueueConfig {
        QueueConfig::new(&self.broker_uri, queue_name)
            .with_publish_timeout(self.publish_timeout)
            .with_handler_timeout(self.handler_timeout)
    }

    fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            broker_uri: lookup("BROKER_URI").ok_or(ConfigError::Missing("BROKER_URI"))?,
            user_queue: lookup("USER_QUEUE_NAME").unwrap_or_else(|| "user".to_string()),
            user_compensate_queue: lookup("USER_COMPENSATE_QUEUE_NAME")
                .unwrap_or_else(|| "user_compensate".to_string()),
            rate_queue: lookup("RATE_QUEUE_NAME").unwrap_or_else(|| "rate".to_string()),
            mail_queue: lookup("MAIL_QUEUE_NAME").unwrap_or_else(|| "mail".to_string()),
            publish_timeout: seconds(lookup, "PUBLISH_TIMEOUT_SECS", 5)?,
            handler_timeout: seconds(lookup, "HANDLER_TIMEOUT_SECS", 5)?,
        })
    }
}

/// Settings for either service binary.
///
/// Reads everything in [`BrokerConfig`] plus:
/// - `DEBUG`: `true` lowers the default log level to `debug`
/// - `RATE_REFRESH_INTERVAL_SECS` (default `300`)
/// - `NOTIFICATION_INTERVAL_SECS` (default `86400`)
/// - `STATIC_RATE`: USD to UAH quote served by the built-in rate source
/// - `BLOCKING_WORKERS` (default `16`)
/// - `MAIL_FROM` (default `"rates@localhost"`)
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub debug: bool,
    pub broker: BrokerConfig,
    pub rate_refresh_interval: Duration,
    pub notification_interval: Duration,
    pub static_rate: Option<f64>,
    pub blocking_workers: usize,
    pub mail_from: String,
}

impl ServiceConfig {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            debug: lookup("DEBUG").is_some_and(|v| v.eq_ignore_ascii_case("true") || v == "1"),
            broker: BrokerConfig::from_lookup(&lookup)?,
            rate_refresh_interval: seconds(&lookup, "RATE_REFRESH_INTERVAL_SECS", 300)?,
            notification_interval: seconds(&lookup, "NOTIFICATION_INTERVAL_SECS", 86_400)?,
            static_rate: lookup("STATIC_RATE")
                .map(|raw| parse(&raw, "STATIC_RATE"))
                .transpose()?,
            blocking_workers: lookup("BLOCKING_WORKERS")
                .map(|raw| parse(&raw, "BLOCKING_WORKERS"))
                .transpose()?
                .unwrap_or(BlockingCaller::DEFAULT_WORKERS),
            mail_from: lookup("MAIL_FROM").unwrap_or_else(|| "rates@localhost".to_string()),
        })
    }

    /// Returns the built-in quote, which the rate-fetching service needs.
    pub fn require_static_rate(&self) -> Result<f64, ConfigError> {
        self.static_rate.ok_or(ConfigError::Missing("STATIC_RATE"))
    }

    /// Returns the default `RUST_LOG` directive.
    pub fn log_level(&self) -> &'static str {
        if self.debug { "debug" } else { "info" }
    }

    pub fn blocking_caller(&self) -> BlockingCaller {
        BlockingCaller::new(self.blocking_workers, BlockingCaller::DEFAULT_TIMEOUT)
    }
}

fn parse<T>(raw: &str, key: &'static str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn seconds(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: u64,
) -> Result<Duration, ConfigError> {
    let secs = lookup(key)
        .map(|raw| parse::<u64>(&raw, key))
        .transpose()?
        .unwrap_or(default);
    Ok(Duration::from_secs(secs))
}
