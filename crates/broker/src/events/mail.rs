//! Mail commands.

use common::EventId;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::adapter::{EventProducer, Family};
use crate::envelope::EnvelopeKind;
use crate::error::Result;

pub const MAIL: Family = Family {
    name: "mail",
    kind: EnvelopeKind::Command,
};

pub const SEND_EMAIL: &str = "SendEmail";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailData {
    pub emails: Vec<String>,
    pub subject: String,
    pub body: String,
}

impl EventProducer<MailData> {
    /// Publishes a `SendEmail` command.
    pub async fn send_email_command(
        &self,
        cancel: &CancellationToken,
        emails: Vec<String>,
        subject: &str,
        body: &str,
    ) -> Result<EventId> {
        let data = MailData {
            emails,
            subject: subject.to_string(),
            body: body.to_string(),
        };
        self.send(cancel, SEND_EMAIL, data).await
    }
}
