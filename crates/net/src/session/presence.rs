//! Presence broadcaster
//!
//! The online roster is mutated only by the connection registry's
//! first-connect and last-disconnect transitions; this module just
//! snapshots and emits it.

use tokio::sync::mpsc;
use uuid::Uuid;

use super::{Hub, HubState, Outbox};
use crate::protocol::{OnlineUser, ServerEvent};

impl HubState {
    pub(crate) fn roster(&self) -> Vec<OnlineUser> {
        self.online.values().cloned().collect()
    }
}

impl Hub {
    /// Current online roster. Ordering is not meaningful.
    pub async fn online_snapshot(&self) -> Vec<OnlineUser> {
        self.state.read().await.roster()
    }

    /// Queue the full roster for every open connection.
    pub(crate) fn queue_full_roster(&self, state: &HubState, outbox: &mut Outbox) {
        outbox.push_many(
            state.all_senders(),
            ServerEvent::OnlineUsers {
                users: state.roster(),
            },
        );
    }

    /// Queue a roster snapshot for a single connection.
    pub(crate) fn queue_roster_to(
        &self,
        state: &HubState,
        tx: mpsc::Sender<ServerEvent>,
        outbox: &mut Outbox,
    ) {
        outbox.push(
            tx,
            ServerEvent::OnlineUsers {
                users: state.roster(),
            },
        );
    }

    /// Send the current roster to one connection.
    pub async fn send_roster_to(&self, conn_id: Uuid) {
        let mut outbox = Outbox::default();
        {
            let state = self.state.read().await;
            if let Some(tx) = state.sender_of(conn_id) {
                self.queue_roster_to(&state, tx, &mut outbox);
            }
        }
        outbox.deliver();
    }
}
