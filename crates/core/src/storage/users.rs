//! User storage operations

use rusqlite::{params, Connection};
use tracing::instrument;
use uuid::Uuid;

use super::parse::{parse_datetime, parse_uuid, role_from_u8, role_to_u8, OptionalExt};
use super::traits::UserRepository;
use super::Database;
use crate::error::Result;
use crate::models::User;

pub struct UserStore<'a> {
    conn: &'a Connection,
}

impl<'a> UserStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Create a new user
    #[instrument(skip(self, user), fields(user_id = %user.id))]
    pub fn create(&self, user: &User) -> Result<()> {
        self.conn.execute(
            "INSERT INTO users (id, first_name, last_name, avatar, banned, role, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                user.id.to_string(),
                user.first_name,
                user.last_name,
                user.avatar,
                user.banned as i32,
                role_to_u8(user.role),
                user.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Find user by ID
    #[instrument(skip(self))]
    pub fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, first_name, last_name, avatar, banned, role, created_at
             FROM users WHERE id = ?1",
        )?;

        let user = stmt
            .query_row(params![id.to_string()], |row| {
                Ok(User {
                    id: parse_uuid(&row.get::<_, String>(0)?)?,
                    first_name: row.get(1)?,
                    last_name: row.get(2)?,
                    avatar: row.get(3)?,
                    banned: row.get::<_, i32>(4)? != 0,
                    role: role_from_u8(row.get::<_, u8>(5)?),
                    created_at: parse_datetime(&row.get::<_, String>(6)?)?,
                })
            })
            .optional()?;

        Ok(user)
    }

    /// Update avatar reference
    pub fn update_avatar(&self, user_id: Uuid, avatar: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE users SET avatar = ?1 WHERE id = ?2",
            params![avatar, user_id.to_string()],
        )?;
        Ok(())
    }

    /// Update name fields
    pub fn update_name(&self, user_id: Uuid, first_name: &str, last_name: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE users SET first_name = ?1, last_name = ?2 WHERE id = ?3",
            params![first_name, last_name, user_id.to_string()],
        )?;
        Ok(())
    }

    /// Set or clear the ban flag
    #[instrument(skip(self))]
    pub fn set_banned(&self, user_id: Uuid, banned: bool) -> Result<()> {
        self.conn.execute(
            "UPDATE users SET banned = ?1 WHERE id = ?2",
            params![banned as i32, user_id.to_string()],
        )?;
        Ok(())
    }
}

impl UserRepository for Database {
    fn create_user(&self, user: &User) -> Result<()> {
        self.users().create(user)
    }

    fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        self.users().find_by_id(id)
    }

    fn update_avatar(&self, user_id: Uuid, avatar: &str) -> Result<()> {
        self.users().update_avatar(user_id, avatar)
    }

    fn update_name(&self, user_id: Uuid, first_name: &str, last_name: &str) -> Result<()> {
        self.users().update_name(user_id, first_name, last_name)
    }

    fn set_banned(&self, user_id: Uuid, banned: bool) -> Result<()> {
        self.users().set_banned(user_id, banned)
    }
}
