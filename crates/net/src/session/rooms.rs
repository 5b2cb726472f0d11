//! Room membership tracker
//!
//! Public rooms are keyed by display name (a deliberate carry-over from
//! the source system: two users rendering the same name share one
//! membership entry). Private rooms are keyed by a canonical id both
//! participants derive independently.

use tracing::debug;
use uuid::Uuid;

use murmur_core::{Error, MessageRepository, Result};

use super::gate::store_fault;
use super::registry::validate_identity;
use super::typing::clear_typing;
use super::{Hub, HubState, Outbox};
use crate::protocol::{PrivateRoomRequest, ServerEvent};

/// Prefix of every canonical private room id.
pub const PRIVATE_ROOM_PREFIX: &str = "private_";

/// Messages replayed to a connection joining a public room.
const ROOM_HISTORY_LIMIT: u32 = 50;

/// Deterministic room id for a two-party conversation. Pure: sorts the
/// two ids lexicographically, so `canonical(a, b) == canonical(b, a)`.
pub fn canonical_private_room_id(a: Uuid, b: Uuid) -> String {
    let (a, b) = (a.to_string(), b.to_string());
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("{PRIVATE_ROOM_PREFIX}{lo}_{hi}")
}

/// Unwind a connection's presence in a public room: typing trace,
/// member set, then the "user left" broadcast to whoever remains.
/// The leave effects are queued before any caller-side join effects,
/// which is what makes a room switch look atomic to other members.
pub(crate) fn leave_public_room(
    state: &mut HubState,
    conn_id: Uuid,
    room: &str,
    outbox: &mut Outbox,
) {
    let name = match state.connections.get_mut(&conn_id) {
        Some(conn) => {
            let name = conn.display_name();
            conn.current_room = None;
            conn.rooms.remove(room);
            name
        }
        None => return,
    };

    clear_typing(state, room, &name, Some(conn_id), outbox);

    let emptied = state
        .room_members
        .get_mut(room)
        .map(|set| {
            set.remove(&name);
            set.is_empty()
        })
        .unwrap_or(false);
    if emptied {
        state.room_members.remove(room);
    }

    outbox.push_many(
        state.room_senders(room, Some(conn_id)),
        ServerEvent::UserLeft {
            username: name,
            room: room.to_string(),
        },
    );
}

impl Hub {
    /// Join a public room, leaving the connection's current one first.
    /// Rejoining the current room is a membership no-op.
    pub async fn join_room(
        &self,
        conn_id: Uuid,
        room: &str,
        user_id: Uuid,
        first_name: &str,
        last_name: &str,
    ) -> Result<()> {
        let room = room.trim();
        if room.is_empty() {
            return Err(Error::InvalidArgument("room is required".into()));
        }
        validate_identity(user_id, first_name, last_name)?;

        self.verify_user(user_id).await?;

        let history = {
            let store = self.store.lock().await;
            store
                .list_for_room(room, ROOM_HISTORY_LIMIT)
                .map_err(store_fault)?
        };

        let mut outbox = Outbox::default();
        {
            let mut state = self.state.write().await;

            let (name, current) = match state.connections.get_mut(&conn_id) {
                Some(conn) => {
                    conn.user_id = Some(user_id);
                    conn.first_name = first_name.trim().to_string();
                    conn.last_name = last_name.trim().to_string();
                    (conn.display_name(), conn.current_room.clone())
                }
                None => {
                    debug!(%conn_id, "Connection closed during room join");
                    return Ok(());
                }
            };

            if current.as_deref() == Some(room) {
                // Safe to call again; keep the member set consistent.
                state
                    .room_members
                    .entry(room.to_string())
                    .or_default()
                    .insert(name);
            } else {
                if let Some(old) = current {
                    leave_public_room(&mut state, conn_id, &old, &mut outbox);
                }

                if let Some(conn) = state.connections.get_mut(&conn_id) {
                    conn.current_room = Some(room.to_string());
                    conn.rooms.insert(room.to_string());
                }
                state
                    .room_members
                    .entry(room.to_string())
                    .or_default()
                    .insert(name.clone());

                // Replay recent history to the joiner before anything
                // new can arrive for this room.
                if let Some(tx) = state.sender_of(conn_id) {
                    outbox.push(
                        tx,
                        ServerEvent::HistoricalRoomMessages {
                            room: room.to_string(),
                            messages: history,
                        },
                    );
                }

                outbox.push_many(
                    state.room_senders(room, Some(conn_id)),
                    ServerEvent::UserJoined {
                        username: name,
                        room: room.to_string(),
                    },
                );
            }
        }
        outbox.deliver();
        Ok(())
    }

    /// Display names present in a public room.
    pub async fn room_roster(&self, room: &str) -> Vec<String> {
        self.state
            .read()
            .await
            .room_members
            .get(room)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Open a private conversation for this connection and, by fan-out,
    /// for every live connection of the counterpart; all of their open
    /// tabs receive private traffic once any conversation exists.
    /// Idempotent: rejoining an already-joined room changes nothing.
    pub async fn join_private_room(
        &self,
        conn_id: Uuid,
        req: &PrivateRoomRequest,
    ) -> Result<String> {
        validate_identity(req.sender_id, &req.sender_first_name, &req.sender_last_name)?;
        if req.receiver_id.is_nil() {
            return Err(Error::InvalidArgument("receiver id is missing".into()));
        }

        self.verify_user(req.sender_id).await?;
        self.verify_user_exists(req.receiver_id).await?;

        let room = canonical_private_room_id(req.sender_id, req.receiver_id);

        let mut state = self.state.write().await;
        let Some(conn) = state.connections.get_mut(&conn_id) else {
            debug!(%conn_id, "Connection closed during private room join");
            return Ok(room);
        };
        conn.user_id = Some(req.sender_id);
        conn.first_name = req.sender_first_name.trim().to_string();
        conn.last_name = req.sender_last_name.trim().to_string();

        if conn.rooms.contains(&room) {
            return Ok(room);
        }
        conn.rooms.insert(room.clone());
        state
            .private_members
            .entry(room.clone())
            .or_default()
            .insert(req.sender_id);

        // Fan-out join across the counterpart's connection set.
        let peers: Vec<Uuid> = state
            .user_connections
            .get(&req.receiver_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        let mut receiver_joined = false;
        for peer in peers {
            if let Some(peer_conn) = state.connections.get_mut(&peer) {
                peer_conn.rooms.insert(room.clone());
                receiver_joined = true;
            }
        }
        if receiver_joined {
            state
                .private_members
                .entry(room.clone())
                .or_default()
                .insert(req.receiver_id);
        }

        debug!(room = %room, "Private room joined");
        Ok(room)
    }

    /// Leave a private conversation. Local to the calling connection and
    /// user; the counterpart's connections keep their membership.
    pub async fn leave_private_room(
        &self,
        conn_id: Uuid,
        sender_id: Uuid,
        receiver_id: Uuid,
    ) -> Result<()> {
        if sender_id.is_nil() || receiver_id.is_nil() {
            return Err(Error::InvalidArgument("sender and receiver ids are required".into()));
        }
        let room = canonical_private_room_id(sender_id, receiver_id);

        let mut state = self.state.write().await;
        if let Some(conn) = state.connections.get_mut(&conn_id) {
            conn.rooms.remove(&room);
        }
        let emptied = state
            .private_members
            .get_mut(&room)
            .map(|set| {
                set.remove(&sender_id);
                set.is_empty()
            })
            .unwrap_or(false);
        if emptied {
            state.private_members.remove(&room);
        }
        Ok(())
    }
}
