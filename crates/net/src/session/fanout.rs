//! Message fanout
//!
//! Persist-then-publish: every message is written to the store before
//! any event leaves the hub, so a delivered message is always a stored
//! message. Public rooms broadcast to every joined connection including
//! the sender's echo; private conversations split into in-room delivery
//! and out-of-band notifications for the receiver's other connections.

use tracing::debug;
use uuid::Uuid;

use murmur_core::{Error, Message, MessageRepository, Result};

use super::gate::store_fault;
use super::registry::validate_identity;
use super::rooms::canonical_private_room_id;
use super::typing::clear_typing;
use super::{Hub, Outbox};
use crate::protocol::{MessageNotification, PrivateMessage, RoomMessage, ServerEvent};

/// Maximum preview length before truncation kicks in.
const PREVIEW_MAX_CHARS: usize = 100;
/// Characters kept when truncating, before the ellipsis.
const PREVIEW_KEEP_CHARS: usize = 97;

/// Notification preview of a message body. Counts characters, not
/// bytes, so multi-byte text never gets split mid-scalar.
fn preview(text: &str) -> String {
    if text.chars().count() > PREVIEW_MAX_CHARS {
        let mut p: String = text.chars().take(PREVIEW_KEEP_CHARS).collect();
        p.push_str("...");
        p
    } else {
        text.to_string()
    }
}

impl Hub {
    /// Look up the reply target and freeze it into a snapshot. The
    /// target must exist at send time.
    async fn resolve_reply(&self, message: &mut Message, reply_to: Option<Uuid>) -> Result<()> {
        let Some(target_id) = reply_to else {
            return Ok(());
        };
        let store = self.store.lock().await;
        let target = store
            .find_message_by_id(target_id)
            .map_err(store_fault)?
            .ok_or(Error::ReplyTargetNotFound(target_id))?;
        message.reply_to = Some(target.reply_snapshot());
        Ok(())
    }

    async fn persist(&self, message: &Message) -> Result<()> {
        let store = self.store.lock().await;
        store.create_message(message).map_err(store_fault)
    }

    /// Send a message to a public room. The sender's own connection is
    /// included in the broadcast as the delivery echo.
    pub async fn send_message(&self, conn_id: Uuid, payload: &RoomMessage) -> Result<()> {
        let room = payload.room.trim();
        if room.is_empty() {
            return Err(Error::InvalidArgument("room is required".into()));
        }
        validate_identity(payload.user_id, &payload.first_name, &payload.last_name)?;

        let sender_name = format!(
            "{} {}",
            payload.first_name.trim(),
            payload.last_name.trim()
        );
        let mut message = Message::new_room(room.to_string(), payload.user_id, sender_name.clone());
        if let Some(id) = payload.id {
            message.id = id;
        }
        message.text = payload.text.clone();
        message.file_url = payload.file_url.clone();
        message.file_type = payload.file_type.clone();
        message.file_name = payload.file_name.clone();

        // Content check comes first so an empty send never touches the store.
        if !message.has_content() {
            return Err(Error::EmptyMessage);
        }

        self.verify_user(payload.user_id).await?;
        self.resolve_reply(&mut message, payload.reply_to).await?;
        self.persist(&message).await?;

        let mut outbox = Outbox::default();
        {
            let mut state = self.state.write().await;
            // Sending implies the sender stopped typing.
            clear_typing(&mut state, room, &sender_name, Some(conn_id), &mut outbox);
            outbox.push_many(
                state.room_senders(room, None),
                ServerEvent::ReceiveMessage(message),
            );
        }
        outbox.deliver();
        Ok(())
    }

    /// Send a private message, returning the stored message id for the
    /// ack. Delivery is dual-path: connections that joined the
    /// conversation's room get the full message, the receiver's other
    /// connections get a preview notification.
    pub async fn private_message(&self, conn_id: Uuid, payload: &PrivateMessage) -> Result<Uuid> {
        validate_identity(
            payload.sender_id,
            &payload.sender_first_name,
            &payload.sender_last_name,
        )?;
        if payload.receiver_id.is_nil() {
            return Err(Error::InvalidArgument("receiver id is missing".into()));
        }

        let room = canonical_private_room_id(payload.sender_id, payload.receiver_id);
        let sender_name = format!(
            "{} {}",
            payload.sender_first_name.trim(),
            payload.sender_last_name.trim()
        );
        let mut message = Message::new_private(
            room.clone(),
            payload.sender_id,
            sender_name.clone(),
            payload.receiver_id,
        );
        if let Some(id) = payload.id {
            message.id = id;
        }
        message.text = payload.text.clone();
        message.file_url = payload.file_url.clone();
        message.file_type = payload.file_type.clone();
        message.file_name = payload.file_name.clone();

        if !message.has_content() {
            return Err(Error::EmptyMessage);
        }

        self.verify_user(payload.sender_id).await?;
        self.verify_user_exists(payload.receiver_id).await?;
        self.resolve_reply(&mut message, payload.reply_to).await?;
        self.persist(&message).await?;

        let message_id = message.id;
        let notification = MessageNotification {
            message_id,
            room: room.clone(),
            sender_id: payload.sender_id,
            sender_name,
            preview: preview(message.text.as_deref().unwrap_or_default()),
            file_name: message.file_name.clone(),
            created_at: message.created_at,
        };

        let mut outbox = Outbox::default();
        {
            let mut state = self.state.write().await;
            clear_typing(
                &mut state,
                &room,
                &message.sender_name,
                Some(conn_id),
                &mut outbox,
            );

            // Echo to the sending connection whether or not it joined.
            if let Some(tx) = state.sender_of(conn_id) {
                outbox.push(tx, ServerEvent::ReceivePrivateMessage(message.clone()));
            }
            outbox.push_many(
                state.room_senders(&room, Some(conn_id)),
                ServerEvent::ReceivePrivateMessage(message),
            );

            // Receiver connections outside the room get the badge only.
            if let Some(conns) = state.user_connections.get(&payload.receiver_id) {
                for peer in conns {
                    let Some(peer_conn) = state.connections.get(peer) else {
                        continue;
                    };
                    if !peer_conn.rooms.contains(&room) {
                        outbox.push(
                            peer_conn.tx.clone(),
                            ServerEvent::PrivateMessageNotification(notification.clone()),
                        );
                    }
                }
            }
        }
        outbox.deliver();

        debug!(%message_id, room = %room, "Private message delivered");
        Ok(message_id)
    }

    /// Send a private conversation's history to the requesting
    /// connection only, oldest first.
    pub async fn get_private_messages(
        &self,
        conn_id: Uuid,
        user1_id: Uuid,
        user2_id: Uuid,
    ) -> Result<()> {
        if user1_id.is_nil() || user2_id.is_nil() {
            return Err(Error::InvalidArgument("both participant ids are required".into()));
        }

        let messages = {
            let store = self.store.lock().await;
            store
                .list_private_between(user1_id, user2_id)
                .map_err(store_fault)?
        };

        self.send_to(conn_id, ServerEvent::HistoricalPrivateMessages { messages })
            .await;
        Ok(())
    }

    /// Replace an own message's text and republish it to its room.
    pub async fn edit_message(
        &self,
        _conn_id: Uuid,
        message_id: Uuid,
        new_text: &str,
        user_id: Uuid,
    ) -> Result<()> {
        let new_text = new_text.trim();

        let mut message = {
            let store = self.store.lock().await;
            store
                .find_message_by_id(message_id)
                .map_err(store_fault)?
                .ok_or_else(|| Error::NotFound(format!("message {message_id}")))?
        };
        if message.sender_id != user_id {
            return Err(Error::Unauthorized);
        }
        // Text may be emptied only if an attachment still carries content.
        if new_text.is_empty() && message.file_url.is_none() {
            return Err(Error::EmptyMessage);
        }

        {
            let store = self.store.lock().await;
            store
                .update_message_text(message_id, new_text)
                .map_err(store_fault)?;
        }
        message.text = Some(new_text.to_string());
        message.edited = true;

        let mut outbox = Outbox::default();
        {
            let state = self.state.read().await;
            outbox.push_many(
                state.room_senders(&message.room, None),
                ServerEvent::MessageEdited(message),
            );
        }
        outbox.deliver();
        Ok(())
    }

    /// Remove an own message and notify its room.
    pub async fn delete_message(
        &self,
        _conn_id: Uuid,
        message_id: Uuid,
        user_id: Uuid,
    ) -> Result<()> {
        let message = {
            let store = self.store.lock().await;
            store
                .find_message_by_id(message_id)
                .map_err(store_fault)?
                .ok_or_else(|| Error::NotFound(format!("message {message_id}")))?
        };
        if message.sender_id != user_id {
            return Err(Error::Unauthorized);
        }

        {
            let store = self.store.lock().await;
            store.delete_message(message_id).map_err(store_fault)?;
        }

        let mut outbox = Outbox::default();
        {
            let state = self.state.read().await;
            outbox.push_many(
                state.room_senders(&message.room, None),
                ServerEvent::MessageDeleted { message_id },
            );
        }
        outbox.deliver();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil;
    use super::*;
    use crate::protocol::PrivateRoomRequest;

    fn room_message(user_id: Uuid, first: &str, last: &str, room: &str, text: &str) -> RoomMessage {
        RoomMessage {
            id: None,
            user_id,
            first_name: first.to_string(),
            last_name: last.to_string(),
            room: room.to_string(),
            text: Some(text.to_string()),
            file_url: None,
            file_type: None,
            file_name: None,
            reply_to: None,
        }
    }

    fn private_payload(sender: Uuid, receiver: Uuid, text: &str) -> PrivateMessage {
        PrivateMessage {
            request_id: Uuid::new_v4(),
            id: None,
            sender_id: sender,
            sender_first_name: "Ada".to_string(),
            sender_last_name: "Lovelace".to_string(),
            receiver_id: receiver,
            text: Some(text.to_string()),
            file_url: None,
            file_type: None,
            file_name: None,
            reply_to: None,
        }
    }

    async fn join_private(hub: &Hub, conn: Uuid, sender: Uuid, receiver: Uuid) -> String {
        hub.join_private_room(
            conn,
            &PrivateRoomRequest {
                request_id: Uuid::new_v4(),
                sender_id: sender,
                sender_first_name: "Ada".to_string(),
                sender_last_name: "Lovelace".to_string(),
                receiver_id: receiver,
                receiver_first_name: None,
                receiver_last_name: None,
            },
        )
        .await
        .expect("join private room")
    }

    #[test]
    fn test_preview_truncation() {
        assert_eq!(preview("short"), "short");

        let exactly_100: String = "x".repeat(100);
        assert_eq!(preview(&exactly_100), exactly_100);

        let long: String = "y".repeat(150);
        let p = preview(&long);
        assert_eq!(p.chars().count(), 100);
        assert!(p.ends_with("..."));

        // Multi-byte text truncates on character boundaries
        let wide: String = "\u{00e9}".repeat(150);
        let p = preview(&wide);
        assert!(p.ends_with("..."));
        assert_eq!(p.chars().count(), 100);
    }

    #[tokio::test]
    async fn test_room_broadcast_includes_sender() {
        let hub = testutil::hub();
        let ada = testutil::seed_user(&hub, "Ada", "Lovelace").await;
        let bob = testutil::seed_user(&hub, "Bob", "Hope").await;

        let (sender, mut sender_rx) = testutil::attach(&hub).await;
        let (peer, mut peer_rx) = testutil::attach(&hub).await;
        testutil::register(&hub, sender, ada, "Ada", "Lovelace", &mut sender_rx).await;
        testutil::register(&hub, peer, bob, "Bob", "Hope", &mut peer_rx).await;
        hub.join_room(sender, "lobby", ada, "Ada", "Lovelace").await.unwrap();
        hub.join_room(peer, "lobby", bob, "Bob", "Hope").await.unwrap();
        testutil::drain(&mut sender_rx);
        testutil::drain(&mut peer_rx);

        hub.send_message(sender, &room_message(ada, "Ada", "Lovelace", "lobby", "hi"))
            .await
            .unwrap();

        for rx in [&mut sender_rx, &mut peer_rx] {
            let events = testutil::drain(rx);
            assert!(events.iter().any(|e| matches!(
                e,
                ServerEvent::ReceiveMessage(m) if m.text.as_deref() == Some("hi") && !m.private
            )));
        }
    }

    #[tokio::test]
    async fn test_empty_message_rejected_before_store() {
        let hub = testutil::hub();
        let (conn, _rx) = testutil::attach(&hub).await;
        // User id is never looked up; the content check fires first
        let result = hub
            .send_message(conn, &room_message(Uuid::new_v4(), "Ada", "Lovelace", "lobby", "   "))
            .await;
        assert!(matches!(result, Err(Error::EmptyMessage)));
    }

    #[tokio::test]
    async fn test_send_clears_typing_first() {
        let hub = testutil::hub();
        let ada = testutil::seed_user(&hub, "Ada", "Lovelace").await;
        let bob = testutil::seed_user(&hub, "Bob", "Hope").await;

        let (sender, mut sender_rx) = testutil::attach(&hub).await;
        let (peer, mut peer_rx) = testutil::attach(&hub).await;
        testutil::register(&hub, sender, ada, "Ada", "Lovelace", &mut sender_rx).await;
        testutil::register(&hub, peer, bob, "Bob", "Hope", &mut peer_rx).await;
        hub.join_room(sender, "lobby", ada, "Ada", "Lovelace").await.unwrap();
        hub.join_room(peer, "lobby", bob, "Bob", "Hope").await.unwrap();

        hub.typing(
            sender,
            &crate::protocol::TypingPayload {
                room: Some("lobby".to_string()),
                first_name: "Ada".to_string(),
                last_name: "Lovelace".to_string(),
                sender_id: None,
                receiver_id: None,
            },
        )
        .await
        .unwrap();
        testutil::drain(&mut peer_rx);

        hub.send_message(sender, &room_message(ada, "Ada", "Lovelace", "lobby", "done"))
            .await
            .unwrap();

        let events = testutil::drain(&mut peer_rx);
        assert!(matches!(events[0], ServerEvent::UserStoppedTyping { .. }));
        assert!(matches!(events[1], ServerEvent::ReceiveMessage(_)));
    }

    #[tokio::test]
    async fn test_reply_target_must_exist() {
        let hub = testutil::hub();
        let ada = testutil::seed_user(&hub, "Ada", "Lovelace").await;
        let (conn, mut rx) = testutil::attach(&hub).await;
        testutil::register(&hub, conn, ada, "Ada", "Lovelace", &mut rx).await;

        let mut payload = room_message(ada, "Ada", "Lovelace", "lobby", "re: nothing");
        let phantom = Uuid::new_v4();
        payload.reply_to = Some(phantom);

        let result = hub.send_message(conn, &payload).await;
        assert!(matches!(result, Err(Error::ReplyTargetNotFound(id)) if id == phantom));
    }

    #[tokio::test]
    async fn test_private_message_dual_path() {
        let hub = testutil::hub();
        let ada = testutil::seed_user(&hub, "Ada", "Lovelace").await;
        let bob = testutil::seed_user(&hub, "Bob", "Hope").await;

        let (ada_conn, mut ada_rx) = testutil::attach(&hub).await;
        let (bob_joined, mut bob_joined_rx) = testutil::attach(&hub).await;
        testutil::register(&hub, ada_conn, ada, "Ada", "Lovelace", &mut ada_rx).await;
        testutil::register(&hub, bob_joined, bob, "Bob", "Hope", &mut bob_joined_rx).await;

        // Joining fans out to Bob's live connection; a later one stays outside
        let room = join_private(&hub, ada_conn, ada, bob).await;
        let (bob_outside, mut bob_outside_rx) = testutil::attach(&hub).await;
        testutil::register(&hub, bob_outside, bob, "Bob", "Hope", &mut bob_outside_rx).await;

        let long_text = "a".repeat(150);
        let id = hub
            .private_message(ada_conn, &private_payload(ada, bob, &long_text))
            .await
            .unwrap();

        // Sender echo
        let events = testutil::drain(&mut ada_rx);
        assert!(events.iter().any(|e| matches!(
            e,
            ServerEvent::ReceivePrivateMessage(m) if m.id == id && m.room == room
        )));

        // Joined connection gets the full message
        let events = testutil::drain(&mut bob_joined_rx);
        assert!(events.iter().any(|e| matches!(
            e,
            ServerEvent::ReceivePrivateMessage(m) if m.id == id
        )));

        // Outside connection gets the truncated badge only
        let events = testutil::drain(&mut bob_outside_rx);
        assert_eq!(events.len(), 1);
        match &events[0] {
            ServerEvent::PrivateMessageNotification(n) => {
                assert_eq!(n.message_id, id);
                assert_eq!(n.room, room);
                assert!(n.preview.ends_with("..."));
                assert_eq!(n.preview.chars().count(), 100);
            }
            other => panic!("Expected notification, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_private_history_targets_requester_only() {
        let hub = testutil::hub();
        let ada = testutil::seed_user(&hub, "Ada", "Lovelace").await;
        let bob = testutil::seed_user(&hub, "Bob", "Hope").await;

        let (ada_conn, mut ada_rx) = testutil::attach(&hub).await;
        let (bob_conn, mut bob_rx) = testutil::attach(&hub).await;
        testutil::register(&hub, ada_conn, ada, "Ada", "Lovelace", &mut ada_rx).await;
        testutil::register(&hub, bob_conn, bob, "Bob", "Hope", &mut bob_rx).await;
        join_private(&hub, ada_conn, ada, bob).await;

        hub.private_message(ada_conn, &private_payload(ada, bob, "one"))
            .await
            .unwrap();
        hub.private_message(ada_conn, &private_payload(ada, bob, "two"))
            .await
            .unwrap();
        testutil::drain(&mut ada_rx);
        testutil::drain(&mut bob_rx);

        hub.get_private_messages(ada_conn, ada, bob).await.unwrap();

        let events = testutil::drain(&mut ada_rx);
        match &events[..] {
            [ServerEvent::HistoricalPrivateMessages { messages }] => {
                assert_eq!(messages.len(), 2);
                assert_eq!(messages[0].text.as_deref(), Some("one"));
                assert_eq!(messages[1].text.as_deref(), Some("two"));
            }
            other => panic!("Expected history, got {other:?}"),
        }
        assert!(testutil::drain(&mut bob_rx).is_empty());
    }

    #[tokio::test]
    async fn test_edit_requires_ownership() {
        let hub = testutil::hub();
        let ada = testutil::seed_user(&hub, "Ada", "Lovelace").await;
        let bob = testutil::seed_user(&hub, "Bob", "Hope").await;

        let (conn, mut rx) = testutil::attach(&hub).await;
        testutil::register(&hub, conn, ada, "Ada", "Lovelace", &mut rx).await;
        hub.join_room(conn, "lobby", ada, "Ada", "Lovelace").await.unwrap();

        let mut payload = room_message(ada, "Ada", "Lovelace", "lobby", "original");
        let id = Uuid::new_v4();
        payload.id = Some(id);
        hub.send_message(conn, &payload).await.unwrap();
        testutil::drain(&mut rx);

        let result = hub.edit_message(conn, id, "hijacked", bob).await;
        assert!(matches!(result, Err(Error::Unauthorized)));

        hub.edit_message(conn, id, "revised", ada).await.unwrap();
        let events = testutil::drain(&mut rx);
        assert!(events.iter().any(|e| matches!(
            e,
            ServerEvent::MessageEdited(m) if m.id == id && m.edited && m.text.as_deref() == Some("revised")
        )));
    }

    #[tokio::test]
    async fn test_edit_to_empty_requires_attachment() {
        let hub = testutil::hub();
        let ada = testutil::seed_user(&hub, "Ada", "Lovelace").await;
        let (conn, mut rx) = testutil::attach(&hub).await;
        testutil::register(&hub, conn, ada, "Ada", "Lovelace", &mut rx).await;
        hub.join_room(conn, "lobby", ada, "Ada", "Lovelace").await.unwrap();

        let mut payload = room_message(ada, "Ada", "Lovelace", "lobby", "caption");
        let id = Uuid::new_v4();
        payload.id = Some(id);
        hub.send_message(conn, &payload).await.unwrap();

        // Text-only message may not be emptied
        let result = hub.edit_message(conn, id, "  ", ada).await;
        assert!(matches!(result, Err(Error::EmptyMessage)));

        // With an attachment the caption may be cleared
        let mut with_file = room_message(ada, "Ada", "Lovelace", "lobby", "caption");
        let file_id = Uuid::new_v4();
        with_file.id = Some(file_id);
        with_file.file_url = Some("/files/cat.png".to_string());
        hub.send_message(conn, &with_file).await.unwrap();
        hub.edit_message(conn, file_id, "", ada).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_broadcasts_to_room() {
        let hub = testutil::hub();
        let ada = testutil::seed_user(&hub, "Ada", "Lovelace").await;
        let bob = testutil::seed_user(&hub, "Bob", "Hope").await;

        let (sender, mut sender_rx) = testutil::attach(&hub).await;
        let (peer, mut peer_rx) = testutil::attach(&hub).await;
        testutil::register(&hub, sender, ada, "Ada", "Lovelace", &mut sender_rx).await;
        testutil::register(&hub, peer, bob, "Bob", "Hope", &mut peer_rx).await;
        hub.join_room(sender, "lobby", ada, "Ada", "Lovelace").await.unwrap();
        hub.join_room(peer, "lobby", bob, "Bob", "Hope").await.unwrap();

        let mut payload = room_message(ada, "Ada", "Lovelace", "lobby", "going away");
        let id = Uuid::new_v4();
        payload.id = Some(id);
        hub.send_message(sender, &payload).await.unwrap();
        testutil::drain(&mut sender_rx);
        testutil::drain(&mut peer_rx);

        assert!(matches!(
            hub.delete_message(peer, id, bob).await,
            Err(Error::Unauthorized)
        ));

        hub.delete_message(sender, id, ada).await.unwrap();
        let events = testutil::drain(&mut peer_rx);
        assert!(events.iter().any(|e| matches!(
            e,
            ServerEvent::MessageDeleted { message_id } if *message_id == id
        )));

        // Deleting again: the message is gone
        assert!(matches!(
            hub.delete_message(sender, id, ada).await,
            Err(Error::NotFound(_))
        ));
    }
}
