//! Integration tests for typing indicators.
//!
//! Verifies:
//! 1. Indicators reach every room member except the typist.
//! 2. Both started- and stopped-typing signals are forwarded.
//! 3. No typing state is retained by the relay.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use roomcast_proto::codec;
use roomcast_proto::event::{ClientEvent, ServerEvent};
use roomcast_relay::relay::{self, RelayState};
use tokio_tungstenite::tungstenite;

type WsClient =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn start_server() -> std::net::SocketAddr {
    let (addr, _handle) = relay::start_server_with_state("127.0.0.1:0", Arc::new(RelayState::new()))
        .await
        .unwrap();
    addr
}

async fn connect(addr: std::net::SocketAddr) -> WsClient {
    let url = format!("ws://{addr}/ws");
    let (ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    ws
}

async fn send(ws: &mut WsClient, event: &ClientEvent) {
    let bytes = codec::encode(event).unwrap();
    ws.send(tungstenite::Message::Binary(bytes.into()))
        .await
        .unwrap();
}

async fn recv(ws: &mut WsClient) -> ServerEvent {
    let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timed out waiting for server event")
        .unwrap()
        .unwrap();
    codec::decode(&msg.into_data()).unwrap()
}

async fn expect_silence(ws: &mut WsClient) {
    let result = tokio::time::timeout(Duration::from_millis(300), ws.next()).await;
    assert!(result.is_err(), "expected no event, got {result:?}");
}

async fn join_and_drain(ws: &mut WsClient, room_id: &str, username: &str) {
    send(
        ws,
        &ClientEvent::JoinRoom {
            room_id: Some(room_id.to_string()),
            username: Some(username.to_string()),
        },
    )
    .await;
    let _ = recv(ws).await;
}

fn typing(room_id: &str, username: &str, is_typing: bool) -> ClientEvent {
    ClientEvent::Typing {
        room_id: Some(room_id.to_string()),
        username: Some(username.to_string()),
        is_typing,
    }
}

#[tokio::test]
async fn typing_is_forwarded_to_others_but_never_the_typist() {
    let addr = start_server().await;

    let mut alice = connect(addr).await;
    join_and_drain(&mut alice, "lobby", "alice").await;
    let mut bob = connect(addr).await;
    join_and_drain(&mut bob, "lobby", "bob").await;
    let _ = recv(&mut alice).await;
    let _ = recv(&mut alice).await;

    send(&mut alice, &typing("lobby", "alice", true)).await;

    assert_eq!(
        recv(&mut bob).await,
        ServerEvent::UserTyping {
            username: Some("alice".to_string()),
            is_typing: true
        }
    );
    expect_silence(&mut alice).await;
}

#[tokio::test]
async fn stopped_typing_is_forwarded_too() {
    let addr = start_server().await;

    let mut alice = connect(addr).await;
    join_and_drain(&mut alice, "lobby", "alice").await;
    let mut bob = connect(addr).await;
    join_and_drain(&mut bob, "lobby", "bob").await;
    let _ = recv(&mut alice).await;
    let _ = recv(&mut alice).await;

    send(&mut alice, &typing("lobby", "alice", true)).await;
    send(&mut alice, &typing("lobby", "alice", false)).await;

    assert_eq!(
        recv(&mut bob).await,
        ServerEvent::UserTyping {
            username: Some("alice".to_string()),
            is_typing: true
        }
    );
    assert_eq!(
        recv(&mut bob).await,
        ServerEvent::UserTyping {
            username: Some("alice".to_string()),
            is_typing: false
        }
    );
}

#[tokio::test]
async fn typing_does_not_cross_rooms() {
    let addr = start_server().await;

    let mut alice = connect(addr).await;
    join_and_drain(&mut alice, "lobby", "alice").await;
    let mut eve = connect(addr).await;
    join_and_drain(&mut eve, "den", "eve").await;

    send(&mut alice, &typing("lobby", "alice", true)).await;
    expect_silence(&mut eve).await;
}

#[tokio::test]
async fn no_typing_state_survives_for_late_joiners() {
    let addr = start_server().await;

    let mut alice = connect(addr).await;
    join_and_drain(&mut alice, "lobby", "alice").await;
    send(&mut alice, &typing("lobby", "alice", true)).await;

    // Bob joins after the indicator fired; he only ever sees the status
    // update, not a replayed typing signal.
    let mut bob = connect(addr).await;
    join_and_drain(&mut bob, "lobby", "bob").await;
    expect_silence(&mut bob).await;
}
