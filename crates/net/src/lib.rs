//! Murmur network library
//!
//! TCP transport and session layer for the chat backend.
//!
//! # Architecture
//!
//! - **Server**: accepts connections and dispatches client events
//! - **Hub**: in-memory session state (presence, rooms, typing, fanout)
//! - **Client**: connects to a server, used by tools and tests
//! - **Protocol**: length-prefixed JSON events
//!
//! # Usage
//!
//! ```ignore
//! let server = Server::start(DEFAULT_PORT, store).await?;
//!
//! let mut client = Client::connect(server.addr()).await?;
//! client.send(ClientEvent::RegisterUser { .. }).await?;
//!
//! while let Some(event) = client.next_event().await {
//!     match event {
//!         ServerEvent::ReceiveMessage(msg) => { /* handle */ }
//!         _ => {}
//!     }
//! }
//! ```

pub mod client;
pub mod error;
mod frame;
pub mod protocol;
pub mod server;
pub mod session;

pub use client::Client;
pub use error::{Error, Result};
pub use protocol::{ClientEvent, ServerEvent};
pub use server::Server;
pub use session::{canonical_private_room_id, Hub};

/// Default port for Murmur servers
pub const DEFAULT_PORT: u16 = 7878;
