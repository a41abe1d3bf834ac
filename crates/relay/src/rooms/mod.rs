// Room registry: authoritative membership bookkeeping and envelope fan-out.

use std::collections::HashMap;
use std::sync::Arc;

use huddle_common::protocol::envelope::Envelope;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::metrics;

/// Outbound handle for one connected member.
///
/// The unbounded channel decouples fan-out from socket writes: handing an
/// envelope to a member never awaits the member's transport.
#[derive(Debug, Clone)]
pub struct MemberHandle {
    pub session_id: Uuid,
    pub outbound: mpsc::UnboundedSender<Envelope>,
}

#[derive(Debug, Default)]
struct MemberTable {
    /// Set when the registry entry for this room has been removed; a handle
    /// obtained before removal must not insert into it.
    closed: bool,
    live: HashMap<Uuid, MemberHandle>,
}

#[derive(Debug, Default)]
struct Room {
    members: Mutex<MemberTable>,
}

/// In-memory map from room id to the set of currently connected members.
///
/// Rooms exist only by virtue of a non-empty entry: the first `register`
/// creates the entry, removal of the last member deletes it.
///
/// Lock order is always the outer map before a room's member table. The
/// outer lock covers only entry lookup/insert/remove; membership mutation
/// and fan-out run under the per-room lock, so unrelated rooms never
/// contend with each other.
#[derive(Debug, Clone, Default)]
pub struct RoomRegistry {
    rooms: Arc<RwLock<HashMap<String, Arc<Room>>>>,
}

impl RoomRegistry {
    /// Add `member` to `room_id`, creating the room entry if absent.
    ///
    /// Membership is keyed by session id, not user id: the same user may
    /// hold several concurrent sessions and each is a distinct member.
    pub async fn register(&self, room_id: &str, member: MemberHandle) {
        loop {
            let existing = self.rooms.read().await.get(room_id).cloned();
            let room = match existing {
                Some(room) => room,
                None => {
                    let mut rooms = self.rooms.write().await;
                    Arc::clone(rooms.entry(room_id.to_owned()).or_default())
                }
            };

            let mut members = room.members.lock().await;
            if members.closed {
                // Lost the race against empty-room teardown; the map entry
                // is already gone, so take a fresh one.
                continue;
            }
            members.live.insert(member.session_id, member);
            return;
        }
    }

    /// Remove `session_id` from `room_id`. Returns whether it was present.
    ///
    /// Unknown rooms and absent members are no-ops: disconnect cleanup must
    /// stay idempotent against a double trigger. When the member set becomes
    /// empty the room entry itself is removed.
    pub async fn deregister(&self, room_id: &str, session_id: Uuid) -> bool {
        let Some(room) = self.rooms.read().await.get(room_id).cloned() else {
            return false;
        };

        let mut members = room.members.lock().await;
        let removed = members.live.remove(&session_id).is_some();
        let now_empty = members.live.is_empty();
        drop(members);

        if now_empty {
            self.remove_if_empty(room_id, &room).await;
        }
        removed
    }

    /// Garbage-collect `room` if it is still the registry entry for
    /// `room_id` and still empty once both locks are held. A member that
    /// registered between the emptiness observation and this call keeps the
    /// room alive.
    async fn remove_if_empty(&self, room_id: &str, room: &Arc<Room>) {
        let mut rooms = self.rooms.write().await;
        let Some(current) = rooms.get(room_id) else {
            return;
        };
        if !Arc::ptr_eq(current, room) {
            return;
        }

        let mut members = room.members.lock().await;
        if members.live.is_empty() {
            members.closed = true;
            drop(members);
            rooms.remove(room_id);
            debug!(room_id, "room released");
        }
    }

    /// Fan one envelope out to every current member of `room_id`, including
    /// the sender (echo-as-confirmation). Returns the number of members
    /// whose transport accepted the envelope.
    ///
    /// The channel handoff happens under the room lock: concurrent
    /// broadcasts into the same room cannot interleave, so every member
    /// observes the same envelope order. A member whose channel is gone is
    /// logged and skipped; delivery to the remaining members proceeds.
    pub async fn broadcast(&self, room_id: &str, envelope: &Envelope) -> usize {
        let Some(room) = self.rooms.read().await.get(room_id).cloned() else {
            return 0;
        };

        let members = room.members.lock().await;
        let mut delivered = 0;
        for member in members.live.values() {
            if member.outbound.send(envelope.clone()).is_ok() {
                delivered += 1;
            } else {
                metrics::record_broadcast_send_failure();
                warn!(
                    room_id,
                    session_id = %member.session_id,
                    kind = envelope.kind.as_str(),
                    "dropping envelope for member with closed transport"
                );
            }
        }
        delivered
    }

    /// Session ids currently registered in `room_id`; empty when the room
    /// does not exist.
    pub async fn members_of(&self, room_id: &str) -> Vec<Uuid> {
        let Some(room) = self.rooms.read().await.get(room_id).cloned() else {
            return Vec::new();
        };
        let members = room.members.lock().await;
        members.live.keys().copied().collect()
    }

    pub async fn member_count(&self, room_id: &str) -> usize {
        let Some(room) = self.rooms.read().await.get(room_id).cloned() else {
            return 0;
        };
        let count = room.members.lock().await.live.len();
        count
    }

    pub async fn contains_room(&self, room_id: &str) -> bool {
        self.rooms.read().await.contains_key(room_id)
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}
