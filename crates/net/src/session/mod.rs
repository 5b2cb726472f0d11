//! In-memory session state for the chat backend
//!
//! One [`Hub`] instance owns every map the protocol needs: connection
//! records, per-user connection sets, room membership, typing sets, and
//! the global online roster. It is constructed once at server start and
//! shared by `Arc`; every handler goes through its methods, so there is
//! no ambient global state.
//!
//! Locking discipline: the state lock is never held across an await
//! point. Collaborator (store) calls happen before the lock is taken,
//! and any operation that mutates after such a call re-checks that the
//! connection still exists. Outbound events are queued into an
//! [`Outbox`] under the lock and delivered with `try_send` after it is
//! released, fire-and-forget, at-most-once per connection.

mod fanout;
mod gate;
mod presence;
mod registry;
mod rooms;
mod teardown;
mod typing;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

use murmur_core::Database;

use crate::protocol::{OnlineUser, ServerEvent};

pub use rooms::canonical_private_room_id;

/// One open channel and everything the session layer knows about it.
pub(crate) struct ConnectionEntry {
    pub user_id: Option<Uuid>,
    pub first_name: String,
    pub last_name: String,
    /// A connection is in at most one public room at a time.
    pub current_room: Option<String>,
    /// All rooms this connection has joined, public and private.
    /// Teardown walks this set; it is the ground truth.
    pub rooms: HashSet<String>,
    pub tx: mpsc::Sender<ServerEvent>,
}

impl ConnectionEntry {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Shared session state behind the Hub's lock
#[derive(Default)]
pub(crate) struct HubState {
    /// connection id -> session record
    pub connections: HashMap<Uuid, ConnectionEntry>,
    /// user id -> live connection ids; an entry exists iff non-empty
    pub user_connections: HashMap<Uuid, HashSet<Uuid>>,
    /// public room -> display names present
    pub room_members: HashMap<String, HashSet<String>>,
    /// canonical private room id -> participant user ids
    pub private_members: HashMap<String, HashSet<Uuid>>,
    /// room id (public or private) -> display names currently typing
    pub typing: HashMap<String, HashSet<String>>,
    /// global online roster, reference-counted via user_connections
    pub online: HashMap<Uuid, OnlineUser>,
}

impl HubState {
    /// Senders of every connection that has joined `room`, optionally
    /// excluding one connection.
    pub fn room_senders(&self, room: &str, except: Option<Uuid>) -> Vec<mpsc::Sender<ServerEvent>> {
        self.connections
            .iter()
            .filter(|(id, conn)| except != Some(**id) && conn.rooms.contains(room))
            .map(|(_, conn)| conn.tx.clone())
            .collect()
    }

    /// Senders of every open connection.
    pub fn all_senders(&self) -> Vec<mpsc::Sender<ServerEvent>> {
        self.connections.values().map(|c| c.tx.clone()).collect()
    }

    /// Sender of one connection, if still open.
    pub fn sender_of(&self, conn_id: Uuid) -> Option<mpsc::Sender<ServerEvent>> {
        self.connections.get(&conn_id).map(|c| c.tx.clone())
    }
}

/// Outbound events queued while the state lock is held.
///
/// Delivery order is preserved per connection, which is what makes the
/// leave-before-join and stop-typing-before-message orderings visible
/// to clients.
#[derive(Default)]
pub(crate) struct Outbox {
    queued: Vec<(mpsc::Sender<ServerEvent>, ServerEvent)>,
}

impl Outbox {
    pub fn push(&mut self, tx: mpsc::Sender<ServerEvent>, event: ServerEvent) {
        self.queued.push((tx, event));
    }

    pub fn push_many(&mut self, txs: Vec<mpsc::Sender<ServerEvent>>, event: ServerEvent) {
        for tx in txs {
            self.queued.push((tx, event.clone()));
        }
    }

    /// Best-effort delivery. A full or closed queue drops the event for
    /// that recipient; there is no retry.
    pub fn deliver(self) {
        for (tx, event) in self.queued {
            if tx.try_send(event).is_err() {
                debug!("Dropped event for slow or closed connection");
            }
        }
    }
}

/// The session hub: presence, rooms, typing, and message fanout.
pub struct Hub {
    pub(crate) state: RwLock<HubState>,
    pub(crate) store: Arc<Mutex<Database>>,
}

impl Hub {
    pub fn new(store: Arc<Mutex<Database>>) -> Self {
        Self {
            state: RwLock::new(HubState::default()),
            store,
        }
    }

    /// Record a newly opened channel. Called by the transport before any
    /// event for this connection is dispatched.
    pub async fn attach(&self, conn_id: Uuid, tx: mpsc::Sender<ServerEvent>) {
        let mut state = self.state.write().await;
        state.connections.insert(
            conn_id,
            ConnectionEntry {
                user_id: None,
                first_name: String::new(),
                last_name: String::new(),
                current_room: None,
                rooms: HashSet::new(),
                tx,
            },
        );
        debug!(%conn_id, "Connection attached");
    }

    /// Number of open connections.
    pub async fn connection_count(&self) -> usize {
        self.state.read().await.connections.len()
    }

    /// Send one event to one connection, best-effort.
    pub async fn send_to(&self, conn_id: Uuid, event: ServerEvent) {
        let tx = self.state.read().await.sender_of(conn_id);
        if let Some(tx) = tx {
            if tx.try_send(event).is_err() {
                debug!(%conn_id, "Dropped event for slow or closed connection");
            }
        }
    }
}
