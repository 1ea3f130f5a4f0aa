//! Relay server core: shared state, WebSocket handler, and room-scoped
//! event dispatch.
//!
//! The relay accepts WebSocket connections, assigns each an opaque
//! [`ConnId`], and bridges inbound client events to broadcasts scoped to a
//! room. Nothing is persisted and nothing is acknowledged — membership
//! bookkeeping exists only to compute a room's participant count, and
//! every broadcast is fire-and-forget.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use roomcast_proto::codec;
use roomcast_proto::event::{ClientEvent, ServerEvent};
use roomcast_proto::message::ChatMessage;
use roomcast_proto::presence::RoomStatus;
use tokio::sync::{RwLock, mpsc};

use crate::rooms::RoomDirectory;

/// Opaque identifier for a live connection.
///
/// Minted by the relay when the socket upgrades; never appears on the
/// wire and is never reused within a process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(u64);

impl ConnId {
    /// Builds a `ConnId` from a raw value (test fixtures).
    #[must_use]
    pub const fn from_raw(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Shared relay state: the connection registry and the room directory.
///
/// Constructed once at service start and injected into the router via
/// `Arc` — no ambient globals.
pub struct RelayState {
    /// Maps `ConnId` to a channel sender feeding that connection's
    /// WebSocket writer task.
    connections: RwLock<HashMap<ConnId, mpsc::UnboundedSender<Message>>>,
    /// Room membership used for presence accounting.
    pub rooms: RoomDirectory,
    /// Source of fresh connection ids.
    next_conn_id: AtomicU64,
}

impl Default for RelayState {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayState {
    /// Creates a new relay state with no connections and no rooms.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            rooms: RoomDirectory::new(),
            next_conn_id: AtomicU64::new(1),
        }
    }

    /// Mints a fresh connection id.
    fn mint_conn_id(&self) -> ConnId {
        ConnId(self.next_conn_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Registers a connection, storing the sender half of its writer
    /// channel.
    pub async fn register(&self, conn: ConnId, sender: mpsc::UnboundedSender<Message>) {
        let mut conns = self.connections.write().await;
        conns.insert(conn, sender);
    }

    /// Removes a connection from the registry, returning its sender if it
    /// was registered. Dropping the sender closes the writer task's
    /// channel.
    pub async fn unregister(&self, conn: ConnId) -> Option<mpsc::UnboundedSender<Message>> {
        let mut conns = self.connections.write().await;
        conns.remove(&conn)
    }

    /// Returns a clone of the sender for the given connection, if
    /// registered.
    pub async fn get_sender(&self, conn: ConnId) -> Option<mpsc::UnboundedSender<Message>> {
        let conns = self.connections.read().await;
        conns.get(&conn).cloned()
    }

    /// Number of currently registered connections.
    pub async fn connection_count(&self) -> usize {
        let conns = self.connections.read().await;
        conns.len()
    }
}

/// Transient attributes the relay attaches to a connection once it joins
/// a room. Both are unset until the first `JoinRoom`.
struct Session {
    conn_id: ConnId,
    room_id: Option<String>,
    username: Option<String>,
}

impl Session {
    const fn new(conn_id: ConnId) -> Self {
        Self {
            conn_id,
            room_id: None,
            username: None,
        }
    }
}

/// Handles an upgraded WebSocket connection.
///
/// The connection lifecycle:
/// 1. Mint a `ConnId` and register the connection.
/// 2. Spawn a writer task fed by the registered channel.
/// 3. Read frames, dispatching each decoded [`ClientEvent`].
/// 4. On close or read error, unregister and leave the joined room.
pub async fn handle_socket(socket: WebSocket, state: Arc<RelayState>) {
    let conn_id = state.mint_conn_id();
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    state.register(conn_id, tx).await;
    tracing::info!(conn_id = %conn_id, "client connected");

    // Writer task: forwards messages from the channel to the WebSocket.
    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                tracing::warn!(conn_id = %conn_id, "WebSocket write failed");
                break;
            }
        }
    });

    // Reader loop: dispatch inbound events until the peer goes away. If
    // the writer dies first the socket is gone, so stop reading too.
    let mut session = Session::new(conn_id);
    loop {
        tokio::select! {
            frame = ws_receiver.next() => match frame {
                Some(Ok(Message::Binary(data))) => {
                    dispatch_frame(&data, &mut session, &state).await;
                }
                Some(Ok(Message::Close(_))) | None => {
                    tracing::info!(conn_id = %conn_id, "connection closed");
                    break;
                }
                Some(Ok(_)) => {
                    // Ignore text, ping, pong frames.
                }
                Some(Err(e)) => {
                    tracing::warn!(conn_id = %conn_id, error = %e, "WebSocket read failed");
                    break;
                }
            },
            _ = &mut write_task => break,
        }
    }

    // Clean up: unregister first so the departing connection never sees
    // its own room-status update, then leave the joined room.
    state.unregister(conn_id).await;
    handle_disconnect(&session, &state).await;
    write_task.abort();
    tracing::info!(
        conn_id = %conn_id,
        username = ?session.username,
        "client disconnected"
    );
}

/// Decodes a binary frame and dispatches the event. Undecodable frames
/// are logged and dropped; there is no error reply.
async fn dispatch_frame(data: &[u8], session: &mut Session, state: &Arc<RelayState>) {
    let event = match codec::decode::<ClientEvent>(data) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(conn_id = %session.conn_id, error = %e, "failed to decode client event");
            return;
        }
    };

    match event {
        ClientEvent::JoinRoom { room_id, username } => {
            handle_join(state, session, room_id, username).await;
        }
        ClientEvent::SendMessage { room_id, message } => {
            handle_send_message(state, session, room_id.as_deref(), message).await;
        }
        ClientEvent::Typing {
            room_id,
            username,
            is_typing,
        } => {
            handle_typing(state, session, room_id.as_deref(), username, is_typing).await;
        }
    }
}

/// Handles a `JoinRoom` event.
///
/// Joining a different room while already in one leaves the old room
/// first, through the same path as a disconnect. Then the connection is
/// added to the new room's member set, `UserJoined` goes to the other
/// members, and `RoomStatus` goes to the whole room including the joiner,
/// in that order.
async fn handle_join(
    state: &Arc<RelayState>,
    session: &mut Session,
    room_id: Option<String>,
    username: Option<String>,
) {
    let Some(room_id) = room_id else {
        tracing::warn!(conn_id = %session.conn_id, "join without a room id, ignoring");
        return;
    };

    if let Some(previous) = session.room_id.take()
        && previous != room_id
    {
        leave_room(state, session.conn_id, &previous).await;
    }

    let count = state.rooms.join(&room_id, session.conn_id).await;
    session.room_id = Some(room_id.clone());
    session.username = username.clone();

    tracing::info!(
        conn_id = %session.conn_id,
        room_id = %room_id,
        username = ?username,
        count,
        "joined room"
    );

    broadcast(
        state,
        &room_id,
        Some(session.conn_id),
        &ServerEvent::UserJoined { username },
    )
    .await;
    broadcast(
        state,
        &room_id,
        None,
        &ServerEvent::RoomStatus(RoomStatus::from_count(to_count(count))),
    )
    .await;
}

/// Handles a `SendMessage` event: relays the message verbatim to every
/// member of the routing room except the sender, then discards it.
///
/// The routing room need not match the room the connection joined, and a
/// missing or empty room makes the broadcast a silent no-op.
async fn handle_send_message(
    state: &Arc<RelayState>,
    session: &Session,
    room_id: Option<&str>,
    message: ChatMessage,
) {
    let Some(room_id) = room_id else {
        return;
    };
    tracing::debug!(
        conn_id = %session.conn_id,
        room_id = %room_id,
        message_id = ?message.id,
        "relaying message"
    );
    broadcast(
        state,
        room_id,
        Some(session.conn_id),
        &ServerEvent::ReceiveMessage(message),
    )
    .await;
}

/// Handles a `Typing` event: forwards the indicator to every member of
/// the routing room except the sender. No state is retained.
async fn handle_typing(
    state: &Arc<RelayState>,
    session: &Session,
    room_id: Option<&str>,
    username: Option<String>,
    is_typing: bool,
) {
    let Some(room_id) = room_id else {
        return;
    };
    broadcast(
        state,
        room_id,
        Some(session.conn_id),
        &ServerEvent::UserTyping {
            username,
            is_typing,
        },
    )
    .await;
}

/// Handles transport-level disconnect: if the connection had joined a
/// room, it leaves, and any remaining members get a status update. No
/// `UserLeft` event exists — departure is visible only through the count.
async fn handle_disconnect(session: &Session, state: &Arc<RelayState>) {
    if let Some(room_id) = &session.room_id {
        leave_room(state, session.conn_id, room_id).await;
    }
}

/// Removes a connection from a room. If members remain they get a
/// `RoomStatus` update; if the room emptied it has already been deleted
/// by the directory.
async fn leave_room(state: &Arc<RelayState>, conn: ConnId, room_id: &str) {
    match state.rooms.leave(room_id, conn).await {
        Some(0) => {
            tracing::debug!(conn_id = %conn, room_id = %room_id, "room emptied and removed");
        }
        Some(remaining) => {
            broadcast(
                state,
                room_id,
                None,
                &ServerEvent::RoomStatus(RoomStatus::from_count(to_count(remaining))),
            )
            .await;
        }
        None => {}
    }
}

/// Broadcasts a server event to every member of a room, optionally
/// excluding one connection (the originator).
///
/// The event is encoded once; per-member channel sends that fail (peer
/// mid-disconnect) are ignored. Broadcasting to a missing or empty room
/// is a no-op indistinguishable from success.
async fn broadcast(
    state: &Arc<RelayState>,
    room_id: &str,
    exclude: Option<ConnId>,
    event: &ServerEvent,
) {
    let bytes = match codec::encode(event) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(error = %e, "failed to encode server event");
            return;
        }
    };
    let payload = axum::body::Bytes::from(bytes);

    let members = state.rooms.members(room_id).await;
    let conns = state.connections.read().await;
    for member in members {
        if Some(member) == exclude {
            continue;
        }
        if let Some(sender) = conns.get(&member) {
            let _ = sender.send(Message::Binary(payload.clone()));
        }
    }
}

/// Clamps a member count into the wire representation.
fn to_count(count: usize) -> u32 {
    u32::try_from(count).unwrap_or(u32::MAX)
}

/// Starts the relay server on the given address and returns the bound
/// address and a join handle.
///
/// This is the primary entry point used by both `main.rs` and test code.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_state(addr, Arc::new(RelayState::new())).await
}

/// Starts the relay server with a pre-constructed [`RelayState`].
///
/// Tests use this to observe the room directory while clients come and
/// go.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<RelayState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "relay server error");
        }
    });

    Ok((bound_addr, handle))
}

/// Starts the relay server in-process for testing.
///
/// Binds to `127.0.0.1:0` (OS-assigned port) and returns the bound
/// address and a [`tokio::task::JoinHandle`] for cleanup.
#[cfg(test)]
pub async fn start_test_server() -> (std::net::SocketAddr, tokio::task::JoinHandle<()>) {
    start_server("127.0.0.1:0")
        .await
        .expect("failed to start test server")
}

/// axum handler that upgrades an HTTP request to a WebSocket connection.
async fn ws_handler(
    ws: axum::extract::ws::WebSocketUpgrade,
    axum::extract::State(state): axum::extract::State<Arc<RelayState>>,
) -> impl axum::response::IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}
