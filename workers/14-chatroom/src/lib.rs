//! Websocket chatrooms, one actor per room.
//!
//! All sockets for a room attach to the same actor, which serializes every
//! join and message. New joiners receive the room's recent history before
//! the welcome frame.

use async_trait::async_trait;
use axum::Router;
use axum::extract::Path;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use chrono::Utc;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use edgeside::{
    Actor, ActorContext, ActorNamespace, ActorRequest, ActorResponse, SocketId, SocketMessage,
    Worker, WorkerContext, WorkerManifest,
};

const MAX_HISTORY: usize = 50;

const CHAT_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Chatroom</title></head>
<body>
  <h1>Chatroom</h1>
  <div id="log" style="height:20em;overflow-y:scroll;border:1px solid #ccc;padding:0.5em"></div>
  <input id="text" placeholder="Say something..." autofocus>
  <script>
    const room = new URLSearchParams(location.search).get("room") || "lobby";
    const username = prompt("Username?") || "Anonymous";
    const ws = new WebSocket(`ws://${location.host}/room/${room}`);
    const log = (line) => {
      const div = document.createElement("div");
      div.textContent = line;
      document.getElementById("log").appendChild(div);
    };
    ws.onmessage = (event) => {
      const frame = JSON.parse(event.data);
      if (frame.type === "history") {
        frame.messages.forEach((m) => log(`${m.username}: ${m.text}`));
      } else if (frame.type === "system") {
        log(`* ${frame.text}`);
      } else {
        log(`${frame.username}: ${frame.text}`);
      }
    };
    document.getElementById("text").addEventListener("keydown", (event) => {
      if (event.key !== "Enter" || !event.target.value) return;
      ws.send(JSON.stringify({ username, text: event.target.value }));
      event.target.value = "";
    });
  </script>
</body>
</html>
"#;

#[derive(Clone, Serialize)]
struct ChatMessage {
    #[serde(rename = "type")]
    kind: &'static str,
    username: String,
    text: String,
    timestamp: String,
}

#[derive(Default)]
struct Chatroom {
    history: Vec<ChatMessage>,
}

#[async_trait]
impl Actor for Chatroom {
    async fn fetch(&mut self, _ctx: &mut ActorContext, _request: ActorRequest) -> ActorResponse {
        ActorResponse::with_status(400, "Expected WebSocket upgrade")
    }

    async fn socket_open(&mut self, ctx: &mut ActorContext, socket: SocketId) {
        if !self.history.is_empty() {
            let history = json!({ "type": "history", "messages": self.history });
            let _ = ctx.send(socket, history.to_string());
        }
        let welcome = json!({
            "type": "system",
            "text": "Connected to chatroom",
            "timestamp": timestamp(),
        });
        let _ = ctx.send(socket, welcome.to_string());
    }

    async fn socket_message(
        &mut self,
        ctx: &mut ActorContext,
        _socket: SocketId,
        message: SocketMessage,
    ) {
        let Some(text) = message.as_text() else {
            return;
        };
        let Ok(frame) = serde_json::from_str::<Value>(text) else {
            debug!("ignoring malformed chat frame");
            return;
        };
        let text = frame
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if text.trim().is_empty() {
            return;
        }
        let message = ChatMessage {
            kind: "message",
            username: frame
                .get("username")
                .and_then(Value::as_str)
                .unwrap_or("Anonymous")
                .to_owned(),
            text: text.to_owned(),
            timestamp: timestamp(),
        };
        if let Ok(serialized) = serde_json::to_string(&message) {
            ctx.broadcast(serialized);
        }
        self.history.push(message);
        if self.history.len() > MAX_HISTORY {
            self.history.remove(0);
        }
    }

    async fn socket_close(&mut self, ctx: &mut ActorContext, socket: SocketId) {
        debug!(room = %ctx.id(), %socket, "chat socket left");
    }
}

fn timestamp() -> String {
    Utc::now().to_rfc3339()
}

pub fn worker() -> edgeside::Result<Worker> {
    let manifest = WorkerManifest::from_str(include_str!("../worker.toml"))?;
    let router = Router::new()
        .route("/", get(chat_page))
        .route("/room/:name", get(join_room))
        .fallback(not_found);
    Worker::builder()
        .manifest(manifest)
        .router(router)
        .actors("CHATROOM", ActorNamespace::new(Chatroom::default))
        .build()
}

async fn chat_page() -> Html<&'static str> {
    Html(CHAT_PAGE)
}

async fn join_room(
    ctx: WorkerContext,
    Path(name): Path<String>,
    ws: Option<WebSocketUpgrade>,
) -> Response {
    let Some(ws) = ws else {
        return (StatusCode::BAD_REQUEST, "Expected WebSocket upgrade").into_response();
    };
    let rooms = match ctx.env().actors("CHATROOM") {
        Ok(rooms) => rooms,
        Err(err) => {
            return (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response();
        }
    };
    let stub = rooms.get(rooms.id_from_name(&name));
    ws.on_upgrade(move |socket| async move {
        if let Err(error) = stub.attach(socket).await {
            warn!(%error, "failed to hand socket to chatroom");
        }
    })
}

async fn not_found() -> (StatusCode, &'static str) {
    (
        StatusCode::NOT_FOUND,
        "Not found. Use /room/<name> to connect to a chatroom.",
    )
}
