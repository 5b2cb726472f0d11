//! Wire protocol event types
//!
//! All events are JSON-serialized and length-prefixed on the wire.
//! Clients send [`ClientEvent`], the server sends [`ServerEvent`]. The
//! enums are closed: unknown event kinds fail to decode and are rejected
//! at the transport layer rather than silently ignored.

use chrono::{DateTime, Utc};
use murmur_core::Message;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user present in the global online roster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnlineUser {
    pub user_id: Uuid,
    pub username: String,
    pub avatar: Option<String>,
}

/// Payload of a public-room message send
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomMessage {
    /// Client-chosen id for echo reconciliation; assigned server-side if absent
    #[serde(default)]
    pub id: Option<Uuid>,
    pub user_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub room: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub file_type: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    /// Id of the message being replied to
    #[serde(default)]
    pub reply_to: Option<Uuid>,
}

/// Payload of a private message send (ack-style request)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivateMessage {
    pub request_id: Uuid,
    #[serde(default)]
    pub id: Option<Uuid>,
    pub sender_id: Uuid,
    pub sender_first_name: String,
    pub sender_last_name: String,
    pub receiver_id: Uuid,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub file_type: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub reply_to: Option<Uuid>,
}

/// Request to open a private conversation (ack-style request)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivateRoomRequest {
    pub request_id: Uuid,
    pub sender_id: Uuid,
    pub sender_first_name: String,
    pub sender_last_name: String,
    pub receiver_id: Uuid,
    #[serde(default)]
    pub receiver_first_name: Option<String>,
    #[serde(default)]
    pub receiver_last_name: Option<String>,
}

/// Typing indicator payload. Carries either a public room name or the
/// two participant ids of a private conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypingPayload {
    #[serde(default)]
    pub room: Option<String>,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub sender_id: Option<Uuid>,
    #[serde(default)]
    pub receiver_id: Option<Uuid>,
}

/// Out-of-band notification for a private message delivered to a
/// connection that has not joined the conversation's room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageNotification {
    pub message_id: Uuid,
    pub room: String,
    pub sender_id: Uuid,
    pub sender_name: String,
    /// Truncated preview of the message text
    pub preview: String,
    pub file_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Events sent by clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Bind this connection to a verified user identity
    RegisterUser {
        user_id: Uuid,
        first_name: String,
        last_name: String,
        #[serde(default)]
        avatar: Option<String>,
    },

    /// Join a public room (leaving the current one, if any)
    JoinRoom {
        room: String,
        user_id: Uuid,
        first_name: String,
        last_name: String,
    },

    /// Open a private conversation; acked with JoinPrivateRoomAck
    JoinPrivateRoom(PrivateRoomRequest),

    /// Leave a private conversation (this connection only)
    LeavePrivateRoom { sender_id: Uuid, receiver_id: Uuid },

    /// Send a message to a public room
    SendMessage(RoomMessage),

    /// Send a private message; acked with PrivateMessageAck
    PrivateMessage(PrivateMessage),

    /// Request the history of a private conversation
    GetPrivateMessages { user1_id: Uuid, user2_id: Uuid },

    /// Edit an own message
    EditMessage {
        message_id: Uuid,
        new_text: String,
        user_id: Uuid,
    },

    /// Delete an own message
    DeleteMessage { message_id: Uuid, user_id: Uuid },

    /// Started typing
    Typing(TypingPayload),

    /// Stopped typing
    StopTyping(TypingPayload),
}

/// Events sent by the server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Full online roster
    OnlineUsers { users: Vec<OnlineUser> },

    /// A user joined a public room
    UserJoined { username: String, room: String },

    /// A user left a public room
    UserLeft { username: String, room: String },

    /// A user started typing in a room
    UserTyping { username: String, room: String },

    /// A user stopped typing in a room
    UserStoppedTyping { username: String, room: String },

    /// New message in a public room
    ReceiveMessage(Message),

    /// New message in a private conversation the connection has joined
    ReceivePrivateMessage(Message),

    /// Private message badge for connections outside the conversation
    PrivateMessageNotification(MessageNotification),

    /// History of a private conversation, oldest first
    HistoricalPrivateMessages { messages: Vec<Message> },

    /// Recent room history, sent to a connection on join, oldest first
    HistoricalRoomMessages {
        room: String,
        messages: Vec<Message>,
    },

    /// A message's text changed
    MessageEdited(Message),

    /// A message was removed
    MessageDeleted { message_id: Uuid },

    /// Response to JoinPrivateRoom
    JoinPrivateRoomAck {
        request_id: Uuid,
        success: bool,
        room: Option<String>,
        error: Option<String>,
    },

    /// Response to PrivateMessage
    PrivateMessageAck {
        request_id: Uuid,
        success: bool,
        message_id: Option<Uuid>,
        error: Option<String>,
    },

    /// Session-level failure, reported only to the offending connection
    Error { message: String },

    /// Message-operation failure, reported only to the offending connection
    MessageError { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_event_roundtrip() {
        let event = ClientEvent::SendMessage(RoomMessage {
            id: None,
            user_id: Uuid::new_v4(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            room: "lobby".to_string(),
            text: Some("hello".to_string()),
            file_url: None,
            file_type: None,
            file_name: None,
            reply_to: None,
        });

        let bytes = serde_json::to_vec(&event).unwrap();
        let decoded: ClientEvent = serde_json::from_slice(&bytes).unwrap();

        match decoded {
            ClientEvent::SendMessage(m) => {
                assert_eq!(m.room, "lobby");
                assert_eq!(m.text.as_deref(), Some("hello"));
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn test_optional_fields_default() {
        // A minimal typing payload without room/ids must still parse
        let raw = r#"{"type":"Typing","first_name":"Ada","last_name":"Lovelace"}"#;
        let decoded: ClientEvent = serde_json::from_str(raw).unwrap();
        match decoded {
            ClientEvent::Typing(t) => {
                assert!(t.room.is_none());
                assert!(t.sender_id.is_none());
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn test_unknown_kind_fails() {
        let raw = r#"{"type":"SelfDestruct"}"#;
        assert!(serde_json::from_str::<ClientEvent>(raw).is_err());
    }
}
