//! TCP server hosting the chat hub
//!
//! One task per connection for reading, one for writing. Every decoded
//! client event is dispatched to the shared [`Hub`]; failures are
//! reported back to the offending connection only, as an error event or
//! a negative ack, and never tear the connection down.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{ReadHalf, WriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use murmur_core::Database;

use crate::error::{Error, Result};
use crate::frame::{read_frame, write_frame};
use crate::protocol::{ClientEvent, ServerEvent};
use crate::session::Hub;

/// Per-connection outbound queue depth
const EVENT_QUEUE_SIZE: usize = 64;

/// Chat server handle
pub struct Server {
    addr: SocketAddr,
    hub: Arc<Hub>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    /// Bind and start serving on the given port. Port 0 picks a free one.
    pub async fn start(port: u16, store: Arc<Mutex<Database>>) -> Result<Self> {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = TcpListener::bind(addr).await?;
        let bound_addr = listener.local_addr()?;

        info!(addr = %bound_addr, "Server started");

        let (shutdown_tx, _) = broadcast::channel(1);
        let hub = Arc::new(Hub::new(store));

        tokio::spawn(accept_loop(listener, hub.clone(), shutdown_tx.subscribe()));

        Ok(Server {
            addr: bound_addr,
            hub,
            shutdown_tx,
        })
    }

    /// The server's bound address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Shared session hub
    pub fn hub(&self) -> Arc<Hub> {
        self.hub.clone()
    }

    /// Stop accepting connections
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        info!("Server shutdown initiated");
    }
}

/// Accept incoming connections
async fn accept_loop(
    listener: TcpListener,
    hub: Arc<Hub>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        debug!(addr = %addr, "New connection");
                        tokio::spawn(handle_connection(stream, addr, hub.clone()));
                    }
                    Err(e) => {
                        error!(error = %e, "Accept failed");
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Accept loop shutting down");
                break;
            }
        }
    }
}

/// Handle a single client connection from attach to teardown
async fn handle_connection(stream: TcpStream, addr: SocketAddr, hub: Arc<Hub>) {
    let conn_id = Uuid::new_v4();
    let (mut reader, writer) = tokio::io::split(stream);

    let (tx, rx) = mpsc::channel(EVENT_QUEUE_SIZE);
    hub.attach(conn_id, tx).await;
    let writer_handle = tokio::spawn(writer_task(writer, rx));

    info!(addr = %addr, %conn_id, "Connection opened");

    loop {
        match read_frame(&mut reader).await {
            Ok(event) => {
                dispatch(&hub, conn_id, event).await;
            }
            Err(Error::ConnectionClosed) => {
                debug!(%conn_id, "Connection closed");
                break;
            }
            Err(Error::Protocol(msg)) => {
                // Frames are length-delimited, so one bad payload does
                // not desynchronize the stream.
                warn!(%conn_id, error = %msg, "Malformed event");
                hub.send_to(
                    conn_id,
                    ServerEvent::Error {
                        message: "malformed event".to_string(),
                    },
                )
                .await;
            }
            Err(e) => {
                warn!(%conn_id, error = %e, "Read error");
                break;
            }
        }
    }

    writer_handle.abort();
    hub.disconnect(conn_id).await;

    info!(%conn_id, "Connection torn down");
}

/// Writer task, draining the connection's outbound queue
async fn writer_task(mut writer: WriteHalf<TcpStream>, mut rx: mpsc::Receiver<ServerEvent>) {
    while let Some(event) = rx.recv().await {
        if let Err(e) = write_frame(&mut writer, &event).await {
            debug!(error = %e, "Write failed");
            break;
        }
    }
}

/// Client faults are expected traffic; anything else is a server-side
/// problem worth an error-level record.
fn log_fault(err: &murmur_core::Error) {
    if err.is_client_fault() {
        debug!(error = %err, "Rejected client event");
    } else {
        error!(error = %err, "Event handling failed");
    }
}

/// Route one client event into the hub
async fn dispatch(hub: &Hub, conn_id: Uuid, event: ClientEvent) {
    match event {
        ClientEvent::RegisterUser {
            user_id,
            first_name,
            last_name,
            avatar: _,
        } => {
            if let Err(e) = hub.register(conn_id, user_id, &first_name, &last_name).await {
                log_fault(&e);
                hub.send_to(
                    conn_id,
                    ServerEvent::Error {
                        message: e.to_string(),
                    },
                )
                .await;
            }
        }

        ClientEvent::JoinRoom {
            room,
            user_id,
            first_name,
            last_name,
        } => {
            if let Err(e) = hub
                .join_room(conn_id, &room, user_id, &first_name, &last_name)
                .await
            {
                log_fault(&e);
                hub.send_to(
                    conn_id,
                    ServerEvent::Error {
                        message: e.to_string(),
                    },
                )
                .await;
            }
        }

        ClientEvent::JoinPrivateRoom(req) => {
            let ack = match hub.join_private_room(conn_id, &req).await {
                Ok(room) => ServerEvent::JoinPrivateRoomAck {
                    request_id: req.request_id,
                    success: true,
                    room: Some(room),
                    error: None,
                },
                Err(e) => {
                    log_fault(&e);
                    ServerEvent::JoinPrivateRoomAck {
                        request_id: req.request_id,
                        success: false,
                        room: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            hub.send_to(conn_id, ack).await;
        }

        ClientEvent::LeavePrivateRoom {
            sender_id,
            receiver_id,
        } => {
            if let Err(e) = hub.leave_private_room(conn_id, sender_id, receiver_id).await {
                log_fault(&e);
                hub.send_to(
                    conn_id,
                    ServerEvent::Error {
                        message: e.to_string(),
                    },
                )
                .await;
            }
        }

        ClientEvent::SendMessage(msg) => {
            if let Err(e) = hub.send_message(conn_id, &msg).await {
                log_fault(&e);
                hub.send_to(
                    conn_id,
                    ServerEvent::MessageError {
                        message: e.to_string(),
                    },
                )
                .await;
            }
        }

        ClientEvent::PrivateMessage(msg) => {
            let ack = match hub.private_message(conn_id, &msg).await {
                Ok(message_id) => ServerEvent::PrivateMessageAck {
                    request_id: msg.request_id,
                    success: true,
                    message_id: Some(message_id),
                    error: None,
                },
                Err(e) => {
                    log_fault(&e);
                    ServerEvent::PrivateMessageAck {
                        request_id: msg.request_id,
                        success: false,
                        message_id: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            hub.send_to(conn_id, ack).await;
        }

        ClientEvent::GetPrivateMessages { user1_id, user2_id } => {
            if let Err(e) = hub.get_private_messages(conn_id, user1_id, user2_id).await {
                log_fault(&e);
                hub.send_to(
                    conn_id,
                    ServerEvent::MessageError {
                        message: e.to_string(),
                    },
                )
                .await;
            }
        }

        ClientEvent::EditMessage {
            message_id,
            new_text,
            user_id,
        } => {
            if let Err(e) = hub.edit_message(conn_id, message_id, &new_text, user_id).await {
                log_fault(&e);
                hub.send_to(
                    conn_id,
                    ServerEvent::MessageError {
                        message: e.to_string(),
                    },
                )
                .await;
            }
        }

        ClientEvent::DeleteMessage {
            message_id,
            user_id,
        } => {
            if let Err(e) = hub.delete_message(conn_id, message_id, user_id).await {
                log_fault(&e);
                hub.send_to(
                    conn_id,
                    ServerEvent::MessageError {
                        message: e.to_string(),
                    },
                )
                .await;
            }
        }

        ClientEvent::Typing(payload) => {
            if let Err(e) = hub.typing(conn_id, &payload).await {
                log_fault(&e);
                hub.send_to(
                    conn_id,
                    ServerEvent::Error {
                        message: e.to_string(),
                    },
                )
                .await;
            }
        }

        ClientEvent::StopTyping(payload) => {
            if let Err(e) = hub.stop_typing(conn_id, &payload).await {
                log_fault(&e);
                hub.send_to(
                    conn_id,
                    ServerEvent::Error {
                        message: e.to_string(),
                    },
                )
                .await;
            }
        }
    }
}
