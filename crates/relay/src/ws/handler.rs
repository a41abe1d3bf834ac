// Connection lifecycle: join/relay/leave around registry mutations.

use super::session::{screen_inbound, ChatSession};
use crate::metrics;
use crate::rooms::{MemberHandle, RoomRegistry};
use axum::extract::ws::{Message, WebSocket};
use huddle_common::protocol::envelope::{decode_envelope, encode_envelope, Envelope, EnvelopeKind};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Register `session` and announce it to its room.
///
/// The join envelope goes out after registration, so the new member receives
/// its own join: clients reconstruct the membership transcript from the
/// stream instead of asking who is present.
pub(crate) async fn connect_session(
    registry: &RoomRegistry,
    session: &ChatSession,
    outbound: mpsc::UnboundedSender<Envelope>,
) {
    registry
        .register(
            &session.room_id,
            MemberHandle { session_id: session.session_id, outbound },
        )
        .await;

    let join = session.lifecycle_envelope(EnvelopeKind::Join);
    registry.broadcast(&session.room_id, &join).await;
    metrics::record_connection_opened();
    info!(
        session_id = %session.session_id,
        room_id = %session.room_id,
        user_id = %session.identity.user_id,
        "session joined"
    );
}

/// Run the disconnect sequence for `session`. Returns whether it ran.
///
/// `deregister` reports whether the session was still a member; a second
/// trigger (e.g. a transport error racing an explicit close) finds it gone
/// and skips the leave broadcast, keeping the sequence exactly-once. The
/// departing session is already out of the member set when the leave goes
/// out, so only the remaining members receive it.
pub(crate) async fn disconnect_session(registry: &RoomRegistry, session: &ChatSession) -> bool {
    if !registry.deregister(&session.room_id, session.session_id).await {
        return false;
    }

    let leave = session.lifecycle_envelope(EnvelopeKind::Leave);
    registry.broadcast(&session.room_id, &leave).await;
    metrics::record_connection_closed();
    info!(
        session_id = %session.session_id,
        room_id = %session.room_id,
        user_id = %session.identity.user_id,
        "session left"
    );
    true
}

/// Handle one inbound text frame: decode, screen, normalize, broadcast.
///
/// Every failure mode drops the frame and keeps the connection open; the
/// room never observes a rejected envelope. Returns the relayed envelope
/// when the frame passed screening.
pub(crate) async fn relay_inbound(
    registry: &RoomRegistry,
    session: &ChatSession,
    raw: &str,
) -> Option<Envelope> {
    let envelope = match decode_envelope(raw) {
        Ok(envelope) => envelope,
        Err(error) => {
            metrics::record_dropped_envelope("undecodable");
            debug!(
                session_id = %session.session_id,
                room_id = %session.room_id,
                %error,
                "dropping undecodable frame"
            );
            return None;
        }
    };

    match screen_inbound(session, envelope) {
        Ok(relayed) => {
            registry.broadcast(&session.room_id, &relayed).await;
            metrics::record_relayed_envelope();
            Some(relayed)
        }
        Err(reason) => {
            metrics::record_dropped_envelope(reason.as_str());
            warn!(
                session_id = %session.session_id,
                room_id = %session.room_id,
                user_id = %session.identity.user_id,
                reason = reason.as_str(),
                "dropping inbound envelope"
            );
            None
        }
    }
}

/// Pump one connection until it closes, then run the disconnect sequence.
///
/// The select loop interleaves the outbound channel (envelopes broadcast
/// into this session's room) with inbound frames. Any exit path — clean
/// close, transport error, outbound channel gone — falls through to the
/// single `disconnect_session` call below the loop.
pub(crate) async fn handle_socket(
    registry: RoomRegistry,
    session: ChatSession,
    mut socket: WebSocket,
) {
    let (outbound_sender, mut outbound_receiver) = mpsc::unbounded_channel::<Envelope>();
    connect_session(&registry, &session, outbound_sender).await;

    loop {
        tokio::select! {
            maybe_outbound = outbound_receiver.recv() => {
                match maybe_outbound {
                    Some(envelope) => {
                        if send_envelope(&mut socket, &envelope).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            maybe_message = socket.recv() => {
                let Some(message) = maybe_message else {
                    break;
                };

                match message {
                    Ok(Message::Text(raw)) => {
                        relay_inbound(&registry, &session, &raw).await;
                    }
                    Ok(Message::Ping(payload)) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(error) => {
                        debug!(
                            session_id = %session.session_id,
                            room_id = %session.room_id,
                            %error,
                            "transport error, closing session"
                        );
                        break;
                    }
                }
            }
        }
    }

    disconnect_session(&registry, &session).await;
}

async fn send_envelope(socket: &mut WebSocket, envelope: &Envelope) -> Result<(), ()> {
    let encoded = encode_envelope(envelope).map_err(|_| ())?;
    socket.send(Message::Text(encoded.into())).await.map_err(|_| ())
}
