//! Connection registry
//!
//! Binds connections to user identities and reference-counts the
//! per-user connection sets that drive the online roster.

use std::collections::HashSet;

use tracing::{debug, info};
use uuid::Uuid;

use murmur_core::{Error, Result};

use super::{Hub, Outbox};
use crate::protocol::OnlineUser;

/// Reject empty names and the serialized sentinels some JS clients are
/// known to send in place of a missing value.
pub(crate) fn valid_name(s: &str) -> bool {
    let t = s.trim();
    !t.is_empty() && t != "null" && t != "undefined"
}

pub(crate) fn validate_identity(user_id: Uuid, first_name: &str, last_name: &str) -> Result<()> {
    if user_id.is_nil() {
        return Err(Error::InvalidArgument("user id is missing".into()));
    }
    if !valid_name(first_name) || !valid_name(last_name) {
        return Err(Error::InvalidArgument("first and last name are required".into()));
    }
    Ok(())
}

impl Hub {
    /// Bind a connection to a verified user.
    ///
    /// The user's first connection inserts it into the online roster and
    /// broadcasts the full roster to everyone; later connections only
    /// receive a snapshot themselves. Re-registration with the same
    /// identity refreshes cached name fields and nothing else.
    pub async fn register(
        &self,
        conn_id: Uuid,
        user_id: Uuid,
        first_name: &str,
        last_name: &str,
    ) -> Result<()> {
        validate_identity(user_id, first_name, last_name)?;

        let user = self.verify_user(user_id).await?;

        let mut outbox = Outbox::default();
        {
            let mut state = self.state.write().await;

            // The gate call suspended; the connection may be gone by now.
            let Some(conn) = state.connections.get_mut(&conn_id) else {
                debug!(%conn_id, "Connection closed during registration");
                return Ok(());
            };
            conn.user_id = Some(user_id);
            conn.first_name = first_name.trim().to_string();
            conn.last_name = last_name.trim().to_string();

            let set = state.user_connections.entry(user_id).or_default();
            let first_connection = set.is_empty();
            set.insert(conn_id);

            if first_connection {
                state.online.insert(
                    user_id,
                    OnlineUser {
                        user_id,
                        username: format!("{} {}", first_name.trim(), last_name.trim()),
                        avatar: user.avatar,
                    },
                );
                info!(%user_id, "User online");
                self.queue_full_roster(&state, &mut outbox);
            } else if let Some(tx) = state.sender_of(conn_id) {
                self.queue_roster_to(&state, tx, &mut outbox);
            }
        }
        outbox.deliver();
        Ok(())
    }

    /// Live connection ids for a user; empty if none.
    pub async fn connections_for(&self, user_id: Uuid) -> HashSet<Uuid> {
        self.state
            .read()
            .await
            .user_connections
            .get(&user_id)
            .cloned()
            .unwrap_or_default()
    }
}
