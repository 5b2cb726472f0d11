//! Message storage operations

use rusqlite::{params, Connection, Row};
use tracing::instrument;
use uuid::Uuid;

use super::parse::{parse_datetime, parse_uuid, parse_uuid_opt, OptionalExt};
use super::traits::MessageRepository;
use super::Database;
use crate::error::Result;
use crate::models::{Message, ReplySnapshot};

pub struct MessageStore<'a> {
    conn: &'a Connection,
}

const MESSAGE_COLUMNS: &str = "id, room, is_private, sender_id, sender_name, receiver_id, \
     text, file_url, file_type, file_name, \
     reply_to_id, reply_sender_name, reply_text, reply_file_url, \
     edited, created_at";

impl<'a> MessageStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Persist a new message
    #[instrument(skip(self, message), fields(message_id = %message.id, room = %message.room))]
    pub fn create(&self, message: &Message) -> Result<()> {
        let reply = message.reply_to.as_ref();
        self.conn.execute(
            "INSERT INTO messages (id, room, is_private, sender_id, sender_name, receiver_id,
                 text, file_url, file_type, file_name,
                 reply_to_id, reply_sender_name, reply_text, reply_file_url,
                 edited, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                message.id.to_string(),
                message.room,
                message.private as i32,
                message.sender_id.to_string(),
                message.sender_name,
                message.receiver_id.map(|id| id.to_string()),
                message.text,
                message.file_url,
                message.file_type,
                message.file_name,
                reply.map(|r| r.message_id.to_string()),
                reply.map(|r| r.sender_name.clone()),
                reply.and_then(|r| r.text.clone()),
                reply.and_then(|r| r.file_url.clone()),
                message.edited as i32,
                message.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Get message by ID
    pub fn find_by_id(&self, id: Uuid) -> Result<Option<Message>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"
        ))?;

        let message = stmt
            .query_row(params![id.to_string()], Self::map_message)
            .optional()?;

        Ok(message)
    }

    /// List the private conversation between two users, oldest first
    #[instrument(skip(self))]
    pub fn list_private_between(&self, user_a: Uuid, user_b: Uuid) -> Result<Vec<Message>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE is_private = 1
               AND ((sender_id = ?1 AND receiver_id = ?2)
                 OR (sender_id = ?2 AND receiver_id = ?1))
             ORDER BY created_at ASC"
        ))?;

        let messages = stmt
            .query_map(
                params![user_a.to_string(), user_b.to_string()],
                Self::map_message,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(messages)
    }

    /// List recent messages for a room, oldest first
    pub fn list_for_room(&self, room: &str, limit: u32) -> Result<Vec<Message>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE room = ?1
             ORDER BY created_at DESC
             LIMIT ?2"
        ))?;

        let mut messages = stmt
            .query_map(params![room, limit], Self::map_message)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        // Reverse to get chronological order
        messages.reverse();
        Ok(messages)
    }

    /// Replace message text and mark it edited
    pub fn update_text(&self, message_id: Uuid, new_text: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE messages SET text = ?1, edited = 1 WHERE id = ?2",
            params![new_text, message_id.to_string()],
        )?;
        Ok(())
    }

    /// Hard-delete a message. No tombstone is kept.
    #[instrument(skip(self))]
    pub fn delete(&self, message_id: Uuid) -> Result<()> {
        self.conn.execute(
            "DELETE FROM messages WHERE id = ?1",
            params![message_id.to_string()],
        )?;
        Ok(())
    }

    fn map_message(row: &Row<'_>) -> rusqlite::Result<Message> {
        let reply_to = match parse_uuid_opt(row.get::<_, Option<String>>(10)?)? {
            Some(message_id) => Some(ReplySnapshot {
                message_id,
                sender_name: row.get::<_, Option<String>>(11)?.unwrap_or_default(),
                text: row.get(12)?,
                file_url: row.get(13)?,
            }),
            None => None,
        };

        Ok(Message {
            id: parse_uuid(&row.get::<_, String>(0)?)?,
            room: row.get(1)?,
            private: row.get::<_, i32>(2)? != 0,
            sender_id: parse_uuid(&row.get::<_, String>(3)?)?,
            sender_name: row.get(4)?,
            receiver_id: parse_uuid_opt(row.get::<_, Option<String>>(5)?)?,
            text: row.get(6)?,
            file_url: row.get(7)?,
            file_type: row.get(8)?,
            file_name: row.get(9)?,
            reply_to,
            edited: row.get::<_, i32>(14)? != 0,
            created_at: parse_datetime(&row.get::<_, String>(15)?)?,
        })
    }
}

impl MessageRepository for Database {
    fn create_message(&self, message: &Message) -> Result<()> {
        self.messages().create(message)
    }

    fn find_message_by_id(&self, id: Uuid) -> Result<Option<Message>> {
        self.messages().find_by_id(id)
    }

    fn list_private_between(&self, user_a: Uuid, user_b: Uuid) -> Result<Vec<Message>> {
        self.messages().list_private_between(user_a, user_b)
    }

    fn list_for_room(&self, room: &str, limit: u32) -> Result<Vec<Message>> {
        self.messages().list_for_room(room, limit)
    }

    fn update_message_text(&self, message_id: Uuid, new_text: &str) -> Result<()> {
        self.messages().update_text(message_id, new_text)
    }

    fn delete_message(&self, message_id: Uuid) -> Result<()> {
        self.messages().delete(message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::User;

    fn seed_user(db: &Database, first: &str, last: &str) -> User {
        let user = User::new(first.to_string(), last.to_string());
        db.users().create(&user).unwrap();
        user
    }

    #[test]
    fn test_create_and_find() {
        let db = Database::open_in_memory().unwrap();
        let ada = seed_user(&db, "Ada", "Lovelace");

        let mut msg = Message::new_room("lobby".to_string(), ada.id, ada.display_name());
        msg.text = Some("hello".to_string());
        db.messages().create(&msg).unwrap();

        let found = db.messages().find_by_id(msg.id).unwrap().unwrap();
        assert_eq!(found.text.as_deref(), Some("hello"));
        assert!(!found.private);
        assert!(found.reply_to.is_none());
    }

    #[test]
    fn test_reply_snapshot_survives_roundtrip() {
        let db = Database::open_in_memory().unwrap();
        let ada = seed_user(&db, "Ada", "Lovelace");

        let mut original = Message::new_room("lobby".to_string(), ada.id, ada.display_name());
        original.text = Some("original".to_string());
        db.messages().create(&original).unwrap();

        let mut reply = Message::new_room("lobby".to_string(), ada.id, ada.display_name());
        reply.text = Some("replying".to_string());
        reply.reply_to = Some(original.reply_snapshot());
        db.messages().create(&reply).unwrap();

        let found = db.messages().find_by_id(reply.id).unwrap().unwrap();
        let snapshot = found.reply_to.unwrap();
        assert_eq!(snapshot.message_id, original.id);
        assert_eq!(snapshot.text.as_deref(), Some("original"));
    }

    #[test]
    fn test_private_history_is_symmetric() {
        let db = Database::open_in_memory().unwrap();
        let ada = seed_user(&db, "Ada", "Lovelace");
        let bob = seed_user(&db, "Bob", "Hope");

        for (from, to, body) in [
            (&ada, &bob, "hi bob"),
            (&bob, &ada, "hi ada"),
            (&ada, &bob, "how are you"),
        ] {
            let mut msg = Message::new_private(
                "private_x".to_string(),
                from.id,
                from.display_name(),
                to.id,
            );
            msg.text = Some(body.to_string());
            db.messages().create(&msg).unwrap();
        }

        let forward = db.messages().list_private_between(ada.id, bob.id).unwrap();
        let backward = db.messages().list_private_between(bob.id, ada.id).unwrap();
        assert_eq!(forward.len(), 3);
        assert_eq!(
            forward.iter().map(|m| m.id).collect::<Vec<_>>(),
            backward.iter().map(|m| m.id).collect::<Vec<_>>()
        );
        assert_eq!(forward[0].text.as_deref(), Some("hi bob"));
    }

    #[test]
    fn test_edit_marks_edited() {
        let db = Database::open_in_memory().unwrap();
        let ada = seed_user(&db, "Ada", "Lovelace");

        let mut msg = Message::new_room("lobby".to_string(), ada.id, ada.display_name());
        msg.text = Some("tpyo".to_string());
        db.messages().create(&msg).unwrap();

        db.messages().update_text(msg.id, "typo").unwrap();
        let found = db.messages().find_by_id(msg.id).unwrap().unwrap();
        assert_eq!(found.text.as_deref(), Some("typo"));
        assert!(found.edited);
    }

    #[test]
    fn test_delete_is_hard() {
        let db = Database::open_in_memory().unwrap();
        let ada = seed_user(&db, "Ada", "Lovelace");

        let mut msg = Message::new_room("lobby".to_string(), ada.id, ada.display_name());
        msg.text = Some("gone soon".to_string());
        db.messages().create(&msg).unwrap();

        db.messages().delete(msg.id).unwrap();
        assert!(db.messages().find_by_id(msg.id).unwrap().is_none());
    }
}
