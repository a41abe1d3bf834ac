// Message envelope types for the huddle-chat.v1 protocol.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// All envelope kinds in the huddle-chat.v1 protocol.
///
/// This is a closed set: the relay rejects anything else at decode time and
/// no forward-compatibility escape hatch is provided.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeKind {
    /// A human-readable chat message.
    Message,
    /// Synthesized by the relay when a session enters its room.
    Join,
    /// Synthesized by the relay when a session leaves its room.
    Leave,
    /// A typing indicator.
    Typing,
}

impl EnvelopeKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Join => "join",
            Self::Leave => "leave",
            Self::Typing => "typing",
        }
    }

    /// Kinds the relay synthesizes around registry mutations.
    /// Never accepted from a client.
    pub const fn is_lifecycle(self) -> bool {
        matches!(self, Self::Join | Self::Leave)
    }
}

/// The atomic unit exchanged between a client and the relay over a
/// connection, in both directions.
///
/// `timestamp` is relay-assigned on acceptance; whatever a client supplies
/// is discarded. `sender_name`/`sender_role` are denormalized display
/// metadata so delivery never needs an identity lookup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub kind: EnvelopeKind,
    pub room_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub sender_role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Structural validation failure for a decoded envelope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    #[error("message envelopes require `content`")]
    MissingContent,
    #[error("{kind} envelopes must not carry `content`")]
    UnexpectedContent { kind: &'static str },
}

impl Envelope {
    /// Check the kind/content shape contract:
    /// `message` requires `content`, `join`/`leave` forbid it, `typing`
    /// accepts either.
    pub fn validate(&self) -> Result<(), EnvelopeError> {
        match self.kind {
            EnvelopeKind::Message if self.content.is_none() => Err(EnvelopeError::MissingContent),
            EnvelopeKind::Join | EnvelopeKind::Leave if self.content.is_some() => {
                Err(EnvelopeError::UnexpectedContent { kind: self.kind.as_str() })
            }
            _ => Ok(()),
        }
    }
}

pub fn decode_envelope(raw: &str) -> Result<Envelope, serde_json::Error> {
    serde_json::from_str::<Envelope>(raw)
}

pub fn encode_envelope(envelope: &Envelope) -> Result<String, serde_json::Error> {
    serde_json::to_string(envelope)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(kind: EnvelopeKind, content: Option<&str>) -> Envelope {
        Envelope {
            kind,
            room_id: "proj-42".into(),
            sender_id: "U1".into(),
            sender_name: "Alice".into(),
            sender_role: "customer".into(),
            content: content.map(Into::into),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn message_requires_content() {
        assert_eq!(
            envelope(EnvelopeKind::Message, None).validate(),
            Err(EnvelopeError::MissingContent)
        );
        assert!(envelope(EnvelopeKind::Message, Some("hello")).validate().is_ok());
    }

    #[test]
    fn lifecycle_kinds_forbid_content() {
        assert_eq!(
            envelope(EnvelopeKind::Join, Some("hi")).validate(),
            Err(EnvelopeError::UnexpectedContent { kind: "join" })
        );
        assert_eq!(
            envelope(EnvelopeKind::Leave, Some("bye")).validate(),
            Err(EnvelopeError::UnexpectedContent { kind: "leave" })
        );
        assert!(envelope(EnvelopeKind::Join, None).validate().is_ok());
        assert!(envelope(EnvelopeKind::Leave, None).validate().is_ok());
    }

    #[test]
    fn typing_content_is_optional() {
        assert!(envelope(EnvelopeKind::Typing, None).validate().is_ok());
        assert!(envelope(EnvelopeKind::Typing, Some("…")).validate().is_ok());
    }

    #[test]
    fn lifecycle_predicate_covers_join_and_leave_only() {
        assert!(EnvelopeKind::Join.is_lifecycle());
        assert!(EnvelopeKind::Leave.is_lifecycle());
        assert!(!EnvelopeKind::Message.is_lifecycle());
        assert!(!EnvelopeKind::Typing.is_lifecycle());
    }

    #[test]
    fn unknown_kind_fails_to_decode() {
        let raw = r#"{
            "kind": "presence",
            "roomId": "proj-42",
            "senderId": "U1",
            "senderName": "Alice",
            "senderRole": "customer",
            "timestamp": "2026-08-07T12:00:00Z"
        }"#;
        assert!(decode_envelope(raw).is_err());
    }

    #[test]
    fn decode_accepts_missing_content() {
        let raw = r#"{
            "kind": "typing",
            "roomId": "proj-42",
            "senderId": "U1",
            "senderName": "Alice",
            "senderRole": "customer",
            "timestamp": "2026-08-07T12:00:00Z"
        }"#;
        let decoded = decode_envelope(raw).expect("typing envelope should decode");
        assert_eq!(decoded.kind, EnvelopeKind::Typing);
        assert!(decoded.content.is_none());
    }
}
