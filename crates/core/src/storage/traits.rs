//! Storage repository traits
//!
//! These traits define the storage interface consumed by the session
//! layer, allowing for different implementations (SQLite, mock).

use uuid::Uuid;

use crate::error::Result;
use crate::models::{Message, User};

/// User repository operations
pub trait UserRepository {
    /// Create a new user
    fn create_user(&self, user: &User) -> Result<()>;

    /// Find user by ID
    fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>>;

    /// Update a user's avatar reference
    fn update_avatar(&self, user_id: Uuid, avatar: &str) -> Result<()>;

    /// Update a user's name fields
    fn update_name(&self, user_id: Uuid, first_name: &str, last_name: &str) -> Result<()>;

    /// Set or clear a user's ban flag
    fn set_banned(&self, user_id: Uuid, banned: bool) -> Result<()>;
}

/// Message repository operations
pub trait MessageRepository {
    /// Persist a new message
    fn create_message(&self, message: &Message) -> Result<()>;

    /// Find message by ID
    fn find_message_by_id(&self, id: Uuid) -> Result<Option<Message>>;

    /// List the private conversation between two users, chronological
    fn list_private_between(&self, user_a: Uuid, user_b: Uuid) -> Result<Vec<Message>>;

    /// List recent messages for a room, chronological
    fn list_for_room(&self, room: &str, limit: u32) -> Result<Vec<Message>>;

    /// Replace a message's text and mark it edited
    fn update_message_text(&self, message_id: Uuid, new_text: &str) -> Result<()>;

    /// Hard-delete a message
    fn delete_message(&self, message_id: Uuid) -> Result<()>;
}

/// Combined storage interface
///
/// Implementations may be backed by SQLite or mocks.
pub trait Storage: UserRepository + MessageRepository {}

// Blanket implementation: any type implementing both traits implements Storage
impl<T> Storage for T where T: UserRepository + MessageRepository {}
