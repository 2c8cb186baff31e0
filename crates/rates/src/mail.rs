//! Email senders and the mail-command consumer.
//!
//! The origin service sends mail by publishing `SendEmail` commands: its
//! [`EmailSender`] is an [`EventProducer<MailData>`]. The mail-owning
//! service consumes those commands with [`MailCommandHandler`] and hands
//! them to a concrete sender.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use broker::{
    BrokerError, Envelope, EventConsumer, EventHandler, EventProducer, MailData, SEND_EMAIL,
};
use tokio_util::sync::CancellationToken;

use crate::error::{RatesError, Result};

/// Delivers one message to a list of recipients.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send_email(
        &self,
        cancel: &CancellationToken,
        emails: &[String],
        subject: &str,
        body: &str,
    ) -> Result<()>;
}

#[async_trait]
impl EmailSender for EventProducer<MailData> {
    async fn send_email(
        &self,
        cancel: &CancellationToken,
        emails: &[String],
        subject: &str,
        body: &str,
    ) -> Result<()> {
        tracing::info!(recipients = emails.len(), "sending email command");
        self.send_email_command(cancel, emails.to_vec(), subject, body)
            .await?;
        Ok(())
    }
}

/// Writes mail to the log instead of delivering it.
#[derive(Debug, Clone)]
pub struct LogEmailSender {
    from: String,
}

impl LogEmailSender {
    pub fn new(from: impl Into<String>) -> Self {
        Self { from: from.into() }
    }
}

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send_email(
        &self,
        _cancel: &CancellationToken,
        emails: &[String],
        subject: &str,
        body: &str,
    ) -> Result<()> {
        for email in emails {
            tracing::info!(from = %self.from, to = %email, subject, body, "sending email");
        }
        Ok(())
    }
}

/// A message accepted by [`RecordingEmailSender`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentEmail {
    pub emails: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// Email sender for tests: records messages, optionally fails.
#[derive(Debug, Clone, Default)]
pub struct RecordingEmailSender {
    sent: Arc<Mutex<Vec<SentEmail>>>,
    fail: Arc<AtomicBool>,
}

impl RecordingEmailSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures every subsequent send to fail.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Returns every message accepted so far.
    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl EmailSender for RecordingEmailSender {
    async fn send_email(
        &self,
        _cancel: &CancellationToken,
        emails: &[String],
        subject: &str,
        body: &str,
    ) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(RatesError::Mail("delivery rejected".to_string()));
        }
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SentEmail {
                emails: emails.to_vec(),
                subject: subject.to_string(),
                body: body.to_string(),
            });
        Ok(())
    }
}

/// Executes `SendEmail` commands with a concrete sender.
pub struct MailCommandHandler {
    sender: Arc<dyn EmailSender>,
    shutdown: CancellationToken,
}

impl MailCommandHandler {
    pub fn new(sender: Arc<dyn EmailSender>, shutdown: CancellationToken) -> Arc<Self> {
        Arc::new(Self { sender, shutdown })
    }

    /// Registers the handler for `SendEmail` on `commands`.
    pub fn register(self: &Arc<Self>, commands: &EventConsumer<MailData>) {
        commands.on(SEND_EMAIL, Arc::clone(self) as Arc<dyn EventHandler<MailData>>);
    }
}

#[async_trait]
impl EventHandler<MailData> for MailCommandHandler {
    async fn handle(&self, envelope: &Envelope<MailData>) -> broker::Result<()> {
        let command = &envelope.data;
        tracing::info!(id = %envelope.id, recipients = command.emails.len(), "executing mail command");
        self.sender
            .send_email(&self.shutdown, &command.emails, &command.subject, &command.body)
            .await
            .map_err(BrokerError::handler)
    }
}
