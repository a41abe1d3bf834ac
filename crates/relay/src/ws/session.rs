// Per-connection session state and inbound envelope screening.

use chrono::Utc;
use huddle_common::protocol::envelope::{Envelope, EnvelopeKind};
use huddle_common::types::ConnectIdentity;
use uuid::Uuid;

/// Server-side state bound to one live connection for its lifetime.
///
/// Identity and room are fixed at connect and never change; switching rooms
/// requires a new connection. The session id is the relay-internal ownership
/// key — membership is tracked per session, not per user.
#[derive(Debug, Clone)]
pub struct ChatSession {
    pub session_id: Uuid,
    pub room_id: String,
    pub identity: ConnectIdentity,
}

impl ChatSession {
    pub fn new(room_id: impl Into<String>, identity: ConnectIdentity) -> Self {
        Self { session_id: Uuid::new_v4(), room_id: room_id.into(), identity }
    }

    /// Synthesize a join/leave envelope carrying this session's identity and
    /// the current relay timestamp.
    pub fn lifecycle_envelope(&self, kind: EnvelopeKind) -> Envelope {
        Envelope {
            kind,
            room_id: self.room_id.clone(),
            sender_id: self.identity.user_id.clone(),
            sender_name: self.identity.user_name.clone(),
            sender_role: self.identity.user_role.clone(),
            content: None,
            timestamp: Utc::now(),
        }
    }
}

/// Why an inbound envelope was dropped instead of relayed.
///
/// None of these are fatal: the connection stays open. The expected source
/// is a stale or buggy client, and killing the connection would hand a
/// hostile client an easy way to knock peers offline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Join/leave are synthesized by the relay only.
    LifecycleKind,
    /// Declared room does not match the session's bound room.
    RoomMismatch,
    /// Declared sender does not match the session's user.
    SenderMismatch,
    /// Kind/content shape violation.
    Malformed,
}

impl DropReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LifecycleKind => "lifecycle_kind",
            Self::RoomMismatch => "room_mismatch",
            Self::SenderMismatch => "sender_mismatch",
            Self::Malformed => "malformed",
        }
    }
}

/// Screen an inbound envelope against the session that produced it.
///
/// Accepted envelopes are normalized before relaying: the relay assigns the
/// timestamp and overwrites the display metadata from session state. A
/// broadcast envelope therefore always carries the room and identity of the
/// session it arrived on, regardless of what the client declared.
pub fn screen_inbound(session: &ChatSession, envelope: Envelope) -> Result<Envelope, DropReason> {
    if envelope.kind.is_lifecycle() {
        return Err(DropReason::LifecycleKind);
    }
    if envelope.room_id != session.room_id {
        return Err(DropReason::RoomMismatch);
    }
    if envelope.sender_id != session.identity.user_id {
        return Err(DropReason::SenderMismatch);
    }
    if envelope.validate().is_err() {
        return Err(DropReason::Malformed);
    }

    Ok(Envelope {
        sender_name: session.identity.user_name.clone(),
        sender_role: session.identity.user_role.clone(),
        timestamp: Utc::now(),
        ..envelope
    })
}

#[cfg(test)]
mod tests {
    use super::{screen_inbound, ChatSession, DropReason};
    use chrono::{TimeZone, Utc};
    use huddle_common::protocol::envelope::{Envelope, EnvelopeKind};
    use huddle_common::types::ConnectIdentity;

    fn session() -> ChatSession {
        ChatSession::new("proj-42", ConnectIdentity::new("U1", "Alice", "customer"))
    }

    fn inbound(kind: EnvelopeKind, room_id: &str, sender_id: &str) -> Envelope {
        Envelope {
            kind,
            room_id: room_id.to_string(),
            sender_id: sender_id.to_string(),
            // Clients may declare anything here; screening must replace it.
            sender_name: "Mallory".to_string(),
            sender_role: "staff".to_string(),
            content: Some("hello".to_string()),
            timestamp: Utc.with_ymd_and_hms(1999, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn accepted_envelope_is_normalized_from_session_state() {
        let session = session();
        let relayed = screen_inbound(&session, inbound(EnvelopeKind::Message, "proj-42", "U1"))
            .expect("matching envelope should pass screening");

        assert_eq!(relayed.sender_name, "Alice");
        assert_eq!(relayed.sender_role, "customer");
        assert_eq!(relayed.content.as_deref(), Some("hello"));
        // Relay-assigned, not the client's 1999 clock.
        assert!(relayed.timestamp.timestamp() > 1_000_000_000);
    }

    #[test]
    fn cross_posting_into_another_room_is_rejected() {
        let outcome = screen_inbound(&session(), inbound(EnvelopeKind::Message, "proj-99", "U1"));
        assert_eq!(outcome.unwrap_err(), DropReason::RoomMismatch);
    }

    #[test]
    fn sender_spoofing_is_rejected() {
        let outcome = screen_inbound(&session(), inbound(EnvelopeKind::Message, "proj-42", "U2"));
        assert_eq!(outcome.unwrap_err(), DropReason::SenderMismatch);
    }

    #[test]
    fn client_supplied_lifecycle_kinds_are_rejected() {
        for kind in [EnvelopeKind::Join, EnvelopeKind::Leave] {
            let outcome = screen_inbound(&session(), inbound(kind, "proj-42", "U1"));
            assert_eq!(outcome.unwrap_err(), DropReason::LifecycleKind);
        }
    }

    #[test]
    fn message_without_content_is_rejected() {
        let mut envelope = inbound(EnvelopeKind::Message, "proj-42", "U1");
        envelope.content = None;
        let outcome = screen_inbound(&session(), envelope);
        assert_eq!(outcome.unwrap_err(), DropReason::Malformed);
    }

    #[test]
    fn typing_indicator_passes_without_content() {
        let mut envelope = inbound(EnvelopeKind::Typing, "proj-42", "U1");
        envelope.content = None;
        assert!(screen_inbound(&session(), envelope).is_ok());
    }

    #[test]
    fn lifecycle_envelope_carries_session_identity() {
        let session = session();
        let join = session.lifecycle_envelope(EnvelopeKind::Join);
        assert_eq!(join.kind, EnvelopeKind::Join);
        assert_eq!(join.room_id, "proj-42");
        assert_eq!(join.sender_id, "U1");
        assert_eq!(join.sender_name, "Alice");
        assert_eq!(join.sender_role, "customer");
        assert!(join.content.is_none());
    }
}
