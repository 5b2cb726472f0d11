//! Message model
//!
//! Messages are opaque to the session layer: it validates them, hands
//! them to the message store, and republishes them to the right
//! audience. `room` holds either a public room name or a canonical
//! private room id (see `murmur-net`), with `private` telling the two
//! apart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Denormalized copy of a replied-to message, captured at send time.
/// Edits to the original do not update this snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplySnapshot {
    pub message_id: Uuid,
    pub sender_name: String,
    pub text: Option<String>,
    pub file_url: Option<String>,
}

/// A chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub room: String,
    pub private: bool,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub receiver_id: Option<Uuid>,
    pub text: Option<String>,
    pub file_url: Option<String>,
    pub file_type: Option<String>,
    pub file_name: Option<String>,
    pub reply_to: Option<ReplySnapshot>,
    pub edited: bool,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Message for a public room broadcast
    pub fn new_room(room: String, sender_id: Uuid, sender_name: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            room,
            private: false,
            sender_id,
            sender_name,
            receiver_id: None,
            text: None,
            file_url: None,
            file_type: None,
            file_name: None,
            reply_to: None,
            edited: false,
            created_at: Utc::now(),
        }
    }

    /// Message for a two-party private conversation
    pub fn new_private(
        room: String,
        sender_id: Uuid,
        sender_name: String,
        receiver_id: Uuid,
    ) -> Self {
        let mut msg = Self::new_room(room, sender_id, sender_name);
        msg.private = true;
        msg.receiver_id = Some(receiver_id);
        msg
    }

    /// A message must carry text or a file attachment.
    pub fn has_content(&self) -> bool {
        self.text.as_deref().is_some_and(|t| !t.trim().is_empty()) || self.file_url.is_some()
    }

    /// Snapshot of this message for reply previews.
    pub fn reply_snapshot(&self) -> ReplySnapshot {
        ReplySnapshot {
            message_id: self.id,
            sender_name: self.sender_name.clone(),
            text: self.text.clone(),
            file_url: self.file_url.clone(),
        }
    }
}
