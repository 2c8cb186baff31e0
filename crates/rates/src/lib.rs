//! Rate fetching, rate history and subscriber mailing.
//!
//! Origin side: a [`RateJob`] asks a [`RateSource`] (usually a
//! [`FallbackRateSource`] chain) for a quote and publishes `RateFetched`.
//!
//! Downstream side: a [`RateRecorder`] appends each fact to a
//! [`RateRepository`]; a [`MailNotifier`] periodically mails the latest
//! rate to every subscriber through an [`EmailSender`], and a
//! [`MailCommandHandler`] executes the resulting `SendEmail` commands.

pub mod error;
pub mod job;
pub mod mail;
pub mod notifier;
pub mod recorder;
pub mod schedule;
pub mod source;
pub mod store;

pub use error::{RatesError, Result};
pub use job::RateJob;
pub use mail::{EmailSender, LogEmailSender, MailCommandHandler, RecordingEmailSender, SentEmail};
pub use notifier::{MailNotifier, PlainRateMessage};
pub use recorder::RateRecorder;
pub use source::{FallbackRateSource, RateSource, StaticRateSource};
pub use store::{InMemoryRateRepository, RateRepository};
