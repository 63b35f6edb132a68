//! Websocket-level coverage for the chatroom worker.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use edgeside_smoke_tests::{ServerGuard, spawn_worker};

type Client = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

async fn chat_server() -> ServerGuard {
    spawn_worker(edgeside_chatroom_example::worker().expect("worker")).await
}

async fn connect(server: &ServerGuard, room: &str) -> Client {
    let (socket, _response) = connect_async(server.ws_url(&format!("/room/{room}")))
        .await
        .expect("websocket connect");
    socket
}

/// Next text frame as JSON, skipping pings and the like.
async fn recv_json(socket: &mut Client) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), socket.next())
            .await
            .expect("timed out waiting for frame")
            .expect("socket ended")
            .expect("socket error");
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).expect("json frame");
        }
    }
}

async fn send_chat(socket: &mut Client, username: &str, text: &str) {
    let frame = json!({ "username": username, "text": text }).to_string();
    socket.send(Message::Text(frame)).await.expect("send");
}

async fn expect_silence(socket: &mut Client) {
    let result = tokio::time::timeout(Duration::from_millis(300), socket.next()).await;
    assert!(result.is_err(), "expected no frame, got {result:?}");
}

#[tokio::test]
async fn broadcast_reaches_every_room_member() {
    let server = chat_server().await;

    let mut alice = connect(&server, "lobby").await;
    let welcome = recv_json(&mut alice).await;
    assert_eq!(welcome["type"], "system");
    assert_eq!(welcome["text"], "Connected to chatroom");

    let mut bob = connect(&server, "lobby").await;
    assert_eq!(recv_json(&mut bob).await["type"], "system");

    send_chat(&mut alice, "alice", "hello bob").await;

    for client in [&mut alice, &mut bob] {
        let message = recv_json(client).await;
        assert_eq!(message["type"], "message");
        assert_eq!(message["username"], "alice");
        assert_eq!(message["text"], "hello bob");
        assert!(message["timestamp"].is_string());
    }
}

#[tokio::test]
async fn late_joiners_receive_history_first() {
    let server = chat_server().await;

    let mut alice = connect(&server, "archive").await;
    recv_json(&mut alice).await; // welcome

    send_chat(&mut alice, "alice", "first").await;
    recv_json(&mut alice).await; // own broadcast
    send_chat(&mut alice, "alice", "second").await;
    recv_json(&mut alice).await;

    let mut carol = connect(&server, "archive").await;
    let history = recv_json(&mut carol).await;
    assert_eq!(history["type"], "history");
    let messages = history["messages"].as_array().expect("messages");
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["text"], "first");
    assert_eq!(messages[1]["text"], "second");
    assert_eq!(recv_json(&mut carol).await["type"], "system");
}

#[tokio::test]
async fn rooms_do_not_leak_into_each_other() {
    let server = chat_server().await;

    let mut alice = connect(&server, "red").await;
    recv_json(&mut alice).await;
    let mut bob = connect(&server, "blue").await;
    recv_json(&mut bob).await;

    send_chat(&mut alice, "alice", "red only").await;
    assert_eq!(recv_json(&mut alice).await["text"], "red only");
    expect_silence(&mut bob).await;
}

#[tokio::test]
async fn plain_http_is_rejected_politely() {
    let server = chat_server().await;
    let base = server.base_url();

    let page = reqwest::get(&base).await.expect("request");
    assert_eq!(page.status(), 200);
    assert!(page.text().await.expect("body").contains("Chatroom"));

    let no_upgrade = reqwest::get(format!("{base}/room/lobby")).await.expect("request");
    assert_eq!(no_upgrade.status(), 400);
    assert_eq!(
        no_upgrade.text().await.expect("body"),
        "Expected WebSocket upgrade"
    );

    let missing = reqwest::get(format!("{base}/nowhere")).await.expect("request");
    assert_eq!(missing.status(), 404);
}
