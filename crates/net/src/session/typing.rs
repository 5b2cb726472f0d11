//! Typing indicator tracker
//!
//! Typing state is a per-room set of display names. Broadcasts fire
//! only on set transitions, so repeated typing events from the same
//! client cost nothing downstream.

use uuid::Uuid;

use murmur_core::{Error, Result};

use super::registry::valid_name;
use super::rooms::canonical_private_room_id;
use super::{Hub, HubState, Outbox};
use crate::protocol::{ServerEvent, TypingPayload};

/// Remove a name from a room's typing set and, if it was present,
/// broadcast the stop to the room. Callers already hold the write lock.
pub(crate) fn clear_typing(
    state: &mut HubState,
    room: &str,
    name: &str,
    except: Option<Uuid>,
    outbox: &mut Outbox,
) {
    let removed = state
        .typing
        .get_mut(room)
        .map(|set| set.remove(name))
        .unwrap_or(false);
    if !removed {
        return;
    }
    if state.typing.get(room).is_some_and(|set| set.is_empty()) {
        state.typing.remove(room);
    }
    outbox.push_many(
        state.room_senders(room, except),
        ServerEvent::UserStoppedTyping {
            username: name.to_string(),
            room: room.to_string(),
        },
    );
}

/// Resolve the room a typing payload refers to. An explicit room wins;
/// otherwise the sender and receiver ids name a private conversation.
fn resolve_room(payload: &TypingPayload) -> Result<String> {
    if let Some(room) = payload.room.as_deref() {
        let room = room.trim();
        if !room.is_empty() {
            return Ok(room.to_string());
        }
    }
    match (payload.sender_id, payload.receiver_id) {
        (Some(sender), Some(receiver)) if !sender.is_nil() && !receiver.is_nil() => {
            Ok(canonical_private_room_id(sender, receiver))
        }
        _ => Err(Error::InvalidArgument(
            "typing event names neither a room nor a conversation".into(),
        )),
    }
}

impl Hub {
    /// Mark the sender as typing in the resolved room. Broadcasts to the
    /// other members only when the name was not already in the set.
    pub async fn typing(&self, conn_id: Uuid, payload: &TypingPayload) -> Result<()> {
        let room = resolve_room(payload)?;
        let name = typing_name(payload)?;

        let mut outbox = Outbox::default();
        {
            let mut state = self.state.write().await;
            let inserted = state
                .typing
                .entry(room.clone())
                .or_default()
                .insert(name.clone());
            if inserted {
                outbox.push_many(
                    state.room_senders(&room, Some(conn_id)),
                    ServerEvent::UserTyping {
                        username: name,
                        room,
                    },
                );
            }
        }
        outbox.deliver();
        Ok(())
    }

    /// Clear the sender's typing mark. Broadcasts only on an actual
    /// removal.
    pub async fn stop_typing(&self, conn_id: Uuid, payload: &TypingPayload) -> Result<()> {
        let room = resolve_room(payload)?;
        let name = typing_name(payload)?;

        let mut outbox = Outbox::default();
        {
            let mut state = self.state.write().await;
            clear_typing(&mut state, &room, &name, Some(conn_id), &mut outbox);
        }
        outbox.deliver();
        Ok(())
    }
}

fn typing_name(payload: &TypingPayload) -> Result<String> {
    if !valid_name(&payload.first_name) || !valid_name(&payload.last_name) {
        return Err(Error::InvalidArgument("first and last name are required".into()));
    }
    Ok(format!(
        "{} {}",
        payload.first_name.trim(),
        payload.last_name.trim()
    ))
}
