//! User model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Avatar reference assigned when a user record has none.
pub const DEFAULT_AVATAR: &str = "/avatars/default.png";

/// Role of a user account. The core only reads this; moderation
/// surfaces live outside the session layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    Member,
    Admin,
}

/// A user account as stored by the user store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub avatar: Option<String>,
    pub banned: bool,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(first_name: String, last_name: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            first_name,
            last_name,
            avatar: None,
            banned: false,
            role: UserRole::Member,
            created_at: Utc::now(),
        }
    }

    /// Rendered display name ("First Last"). Room membership and typing
    /// sets are keyed by this string.
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}
