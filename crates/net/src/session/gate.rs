//! Identity gate
//!
//! Every session-mutating operation verifies the acting user against
//! the user store before touching any map. Failures short-circuit with
//! no state change; the caller reports them to the requesting
//! connection only.

use tracing::warn;
use uuid::Uuid;

use murmur_core::{Error, Result, User, UserRepository, DEFAULT_AVATAR};

use super::Hub;

/// Map a store-layer failure to the collaborator-unavailable category.
/// Domain errors pass through untouched.
pub(crate) fn store_fault(err: Error) -> Error {
    match err {
        Error::Database(e) => Error::StoreUnavailable(e.to_string()),
        other => other,
    }
}

impl Hub {
    /// Confirm the user exists and is not banned. Assigns and persists
    /// the default avatar if the record has none.
    pub(crate) async fn verify_user(&self, user_id: Uuid) -> Result<User> {
        let store = self.store.lock().await;

        let mut user = store
            .find_user_by_id(user_id)
            .map_err(store_fault)?
            .ok_or_else(|| Error::NotFound(format!("user {user_id}")))?;

        if user.banned {
            warn!(%user_id, "Banned user rejected");
            return Err(Error::Banned);
        }

        if user.avatar.is_none() {
            store
                .update_avatar(user_id, DEFAULT_AVATAR)
                .map_err(store_fault)?;
            user.avatar = Some(DEFAULT_AVATAR.to_string());
        }

        Ok(user)
    }

    /// Confirm a counterpart user exists. Bans do not block receiving.
    pub(crate) async fn verify_user_exists(&self, user_id: Uuid) -> Result<User> {
        let store = self.store.lock().await;
        store
            .find_user_by_id(user_id)
            .map_err(store_fault)?
            .ok_or_else(|| Error::NotFound(format!("user {user_id}")))
    }
}
