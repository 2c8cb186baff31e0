//! Envelope wire schema.
//!
//! Every message on the broker is a JSON object:
//!
//! ```text
//! {"eventID": "..", "eventType": "Subscribe", "timestamp": "2024-06-01T12:00:00Z", "data": {..}}
//! ```
//!
//! Commands use `commandID` / `commandType` instead. Decoding accepts either
//! spelling and remembers which one it saw, so a relabelled envelope is
//! re-encoded with the same keys.

use chrono::{DateTime, SecondsFormat, Utc};
use common::EventId;
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{BrokerError, Result};

/// Whether an envelope carries an event (a fact) or a command (a request).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EnvelopeKind {
    #[default]
    Event,
    Command,
}

impl EnvelopeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvelopeKind::Event => "event",
            EnvelopeKind::Command => "command",
        }
    }
}

impl std::fmt::Display for EnvelopeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A broker message: identity, type, timestamp and a typed payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope<T> {
    pub id: EventId,
    pub kind: EnvelopeKind,
    /// Drives dispatch on the consuming side, e.g. `"Subscribe"`.
    pub message_type: String,
    pub timestamp: DateTime<Utc>,
    pub data: T,
}

impl<T> Envelope<T> {
    /// Stamps a payload with a fresh id and the current time.
    pub fn new(kind: EnvelopeKind, message_type: impl Into<String>, data: T) -> Self {
        Self {
            id: EventId::new(),
            kind,
            message_type: message_type.into(),
            timestamp: Utc::now(),
            data,
        }
    }

    pub fn event(message_type: impl Into<String>, data: T) -> Self {
        Self::new(EnvelopeKind::Event, message_type, data)
    }

    pub fn command(message_type: impl Into<String>, data: T) -> Self {
        Self::new(EnvelopeKind::Command, message_type, data)
    }

    /// Keeps id, timestamp and payload but changes the message type.
    pub fn relabel(mut self, message_type: impl Into<String>) -> Self {
        self.message_type = message_type.into();
        self
    }

    /// Replaces the payload, keeping the header.
    pub fn with_data<U>(self, data: U) -> Envelope<U> {
        Envelope {
            id: self.id,
            kind: self.kind,
            message_type: self.message_type,
            timestamp: self.timestamp,
            data,
        }
    }
}

impl<T: Serialize> Envelope<T> {
    /// Encodes the envelope as JSON bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(BrokerError::Encode)
    }
}

impl<T: DeserializeOwned> Envelope<T> {
    /// Decodes JSON bytes into an envelope.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let raw: RawEnvelope<T> = serde_json::from_slice(bytes).map_err(BrokerError::Decode)?;
        raw.try_into()
    }
}

impl<T: Serialize> Serialize for Envelope<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let id = Some(self.id.as_str().to_string());
        let message_type = Some(self.message_type.clone());
        let (event_id, command_id, event_type, command_type) = match self.kind {
            EnvelopeKind::Event => (id, None, message_type, None),
            EnvelopeKind::Command => (None, id, None, message_type),
        };
        RawEnvelope {
            event_id,
            command_id,
            event_type,
            command_type,
            timestamp: self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            data: &self.data,
        }
        .serialize(serializer)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Envelope<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = RawEnvelope::<T>::deserialize(deserializer)?;
        Envelope::try_from(raw).map_err(D::Error::custom)
    }
}

#[derive(Serialize, Deserialize)]
struct RawEnvelope<T> {
    #[serde(rename = "eventID", default, skip_serializing_if = "Option::is_none")]
    event_id: Option<String>,
    #[serde(rename = "commandID", default, skip_serializing_if = "Option::is_none")]
    command_id: Option<String>,
    #[serde(rename = "eventType", default, skip_serializing_if = "Option::is_none")]
    event_type: Option<String>,
    #[serde(rename = "commandType", default, skip_serializing_if = "Option::is_none")]
    command_type: Option<String>,
    timestamp: String,
    data: T,
}

impl<T> TryFrom<RawEnvelope<T>> for Envelope<T> {
    type Error = BrokerError;

    fn try_from(raw: RawEnvelope<T>) -> Result<Self> {
        let (kind, message_type) = match (raw.event_type, raw.command_type) {
            (Some(t), _) => (EnvelopeKind::Event, t),
            (None, Some(t)) => (EnvelopeKind::Command, t),
            (None, None) => {
                return Err(BrokerError::InvalidEnvelope(
                    "missing eventType or commandType".to_string(),
                ));
            }
        };
        let id = raw
            .event_id
            .or(raw.command_id)
            .ok_or_else(|| BrokerError::InvalidEnvelope("missing eventID or commandID".to_string()))?;
        let timestamp = DateTime::parse_from_rfc3339(&raw.timestamp)
            .map_err(|e| {
                BrokerError::InvalidEnvelope(format!("timestamp '{}': {e}", raw.timestamp))
            })?
            .with_timezone(&Utc);

        Ok(Envelope {
            id: EventId::from_raw(id),
            kind,
            message_type,
            timestamp,
            data: raw.data,
        })
    }
}
