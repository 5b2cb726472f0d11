//! Connection teardown
//!
//! A closed connection is unwound in three independent passes over the
//! session maps: public room presence, the online roster, and the
//! typing and private-membership traces across every joined room. Each
//! pass tolerates the others having nothing to do, so a connection that
//! never registered or never joined anything tears down cleanly.

use tracing::{debug, info};
use uuid::Uuid;

use super::rooms;
use super::typing::clear_typing;
use super::{Hub, Outbox};
use crate::protocol::ServerEvent;

impl Hub {
    /// Unwind every trace of a connection. Idempotent; unknown ids are
    /// ignored.
    pub async fn disconnect(&self, conn_id: Uuid) {
        let mut outbox = Outbox::default();
        {
            let mut state = self.state.write().await;
            let Some(entry) = state.connections.remove(&conn_id) else {
                return;
            };
            let name = entry.display_name();

            // Public room presence. The entry is already out of the
            // connection map, so the departure broadcast reaches only
            // the survivors.
            if let Some(room) = entry.current_room.as_deref() {
                clear_typing(&mut state, room, &name, None, &mut outbox);
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
                    state.room_senders(room, None),
                    ServerEvent::UserLeft {
                        username: name.clone(),
                        room: room.to_string(),
                    },
                );
            }

            // Online roster, reference-counted by the connection set.
            if let Some(user_id) = entry.user_id {
                let last = state
                    .user_connections
                    .get_mut(&user_id)
                    .map(|set| {
                        set.remove(&conn_id);
                        set.is_empty()
                    })
                    .unwrap_or(false);
                if last {
                    state.user_connections.remove(&user_id);
                    if state.online.remove(&user_id).is_some() {
                        info!(%user_id, "User offline");
                        self.queue_full_roster(&state, &mut outbox);
                    }
                }
            }

            // Remaining typing traces across every joined room.
            for room in &entry.rooms {
                if entry.current_room.as_deref() == Some(room.as_str()) {
                    continue;
                }
                clear_typing(&mut state, room, &name, None, &mut outbox);
            }

            // Private membership falls away only when no other live
            // connection of the same user still has the room joined.
            if let Some(user_id) = entry.user_id {
                for room in &entry.rooms {
                    if !room.starts_with(rooms::PRIVATE_ROOM_PREFIX) {
                        continue;
                    }
                    let survives = state
                        .connections
                        .values()
                        .any(|c| c.user_id == Some(user_id) && c.rooms.contains(room));
                    if survives {
                        continue;
                    }
                    let emptied = state
                        .private_members
                        .get_mut(room)
                        .map(|set| {
                            set.remove(&user_id);
                            set.is_empty()
                        })
                        .unwrap_or(false);
                    if emptied {
                        state.private_members.remove(room);
                    }
                }
            }

            debug!(%conn_id, "Connection torn down");
        }
        outbox.deliver();
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil;
    use super::*;
    use crate::protocol::{PrivateRoomRequest, TypingPayload};

    #[tokio::test]
    async fn test_disconnect_unknown_connection_is_noop() {
        let hub = testutil::hub();
        hub.disconnect(Uuid::new_v4()).await;
        assert_eq!(hub.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_disconnect_announces_departure() {
        let hub = testutil::hub();
        let ada = testutil::seed_user(&hub, "Ada", "Lovelace").await;
        let bob = testutil::seed_user(&hub, "Bob", "Hope").await;

        let (leaver, mut leaver_rx) = testutil::attach(&hub).await;
        let (watcher, mut watcher_rx) = testutil::attach(&hub).await;
        testutil::register(&hub, leaver, ada, "Ada", "Lovelace", &mut leaver_rx).await;
        testutil::register(&hub, watcher, bob, "Bob", "Hope", &mut watcher_rx).await;
        hub.join_room(leaver, "lobby", ada, "Ada", "Lovelace").await.unwrap();
        hub.join_room(watcher, "lobby", bob, "Bob", "Hope").await.unwrap();
        testutil::drain(&mut watcher_rx);

        hub.disconnect(leaver).await;

        let events = testutil::drain(&mut watcher_rx);
        assert!(events.iter().any(|e| matches!(
            e,
            ServerEvent::UserLeft { username, room } if username == "Ada Lovelace" && room == "lobby"
        )));
        // Roster broadcast follows: Ada's last connection went away
        assert!(events.iter().any(|e| matches!(
            e,
            ServerEvent::OnlineUsers { users } if users.len() == 1 && users[0].user_id == bob
        )));
        assert!(hub.room_roster("lobby").await == vec!["Bob Hope".to_string()]);
    }

    #[tokio::test]
    async fn test_disconnect_clears_typing_trace() {
        let hub = testutil::hub();
        let ada = testutil::seed_user(&hub, "Ada", "Lovelace").await;
        let bob = testutil::seed_user(&hub, "Bob", "Hope").await;

        let (typer, mut typer_rx) = testutil::attach(&hub).await;
        let (watcher, mut watcher_rx) = testutil::attach(&hub).await;
        testutil::register(&hub, typer, ada, "Ada", "Lovelace", &mut typer_rx).await;
        testutil::register(&hub, watcher, bob, "Bob", "Hope", &mut watcher_rx).await;
        hub.join_room(typer, "lobby", ada, "Ada", "Lovelace").await.unwrap();
        hub.join_room(watcher, "lobby", bob, "Bob", "Hope").await.unwrap();

        hub.typing(
            typer,
            &TypingPayload {
                room: Some("lobby".to_string()),
                first_name: "Ada".to_string(),
                last_name: "Lovelace".to_string(),
                sender_id: None,
                receiver_id: None,
            },
        )
        .await
        .unwrap();
        testutil::drain(&mut watcher_rx);

        hub.disconnect(typer).await;

        let events = testutil::drain(&mut watcher_rx);
        assert!(events.iter().any(|e| matches!(
            e,
            ServerEvent::UserStoppedTyping { username, .. } if username == "Ada Lovelace"
        )));
    }

    #[tokio::test]
    async fn test_private_membership_survives_other_connections() {
        let hub = testutil::hub();
        let ada = testutil::seed_user(&hub, "Ada", "Lovelace").await;
        let bob = testutil::seed_user(&hub, "Bob", "Hope").await;

        let (ada_c1, mut rx1) = testutil::attach(&hub).await;
        let (ada_c2, mut rx2) = testutil::attach(&hub).await;
        let (bob_conn, mut bob_rx) = testutil::attach(&hub).await;
        testutil::register(&hub, ada_c1, ada, "Ada", "Lovelace", &mut rx1).await;
        testutil::register(&hub, ada_c2, ada, "Ada", "Lovelace", &mut rx2).await;
        testutil::register(&hub, bob_conn, bob, "Bob", "Hope", &mut bob_rx).await;

        let req = PrivateRoomRequest {
            request_id: Uuid::new_v4(),
            sender_id: ada,
            sender_first_name: "Ada".to_string(),
            sender_last_name: "Lovelace".to_string(),
            receiver_id: bob,
            receiver_first_name: None,
            receiver_last_name: None,
        };
        let room = hub.join_private_room(ada_c1, &req).await.unwrap();
        hub.join_private_room(ada_c2, &req).await.unwrap();

        hub.disconnect(ada_c1).await;
        {
            let state = hub.state.read().await;
            assert!(
                state.private_members[&room].contains(&ada),
                "second connection still holds the room"
            );
        }

        hub.disconnect(ada_c2).await;
        {
            let state = hub.state.read().await;
            assert!(!state
                .private_members
                .get(&room)
                .is_some_and(|set| set.contains(&ada)));
        }
    }
}
