//! Support code for exercising the example workers over real sockets.
//!
//! Every helper binds an ephemeral local port, spawns the server, and waits
//! for the listener to accept connections before returning, so tests can fire
//! requests immediately. Dropping the returned [`ServerGuard`] tears the
//! server down.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::RawQuery;
use axum::extract::ws::{Message, WebSocketUpgrade};
use axum::response::Html;
use axum::routing::{get, post};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use edgeside::Worker;

/// Handle to a running server. The server is aborted on drop.
pub struct ServerGuard {
    addr: SocketAddr,
    task: JoinHandle<()>,
}

impl ServerGuard {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{path}", self.addr)
    }
}

impl Drop for ServerGuard {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Serves `worker` through the full runtime on an ephemeral port.
pub async fn spawn_worker(worker: Worker) -> ServerGuard {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind listener");
    let addr = listener.local_addr().expect("listener addr");
    let task = tokio::spawn(async move {
        if let Err(error) = edgeside::serve_on(worker, listener).await {
            eprintln!("worker server exited: {error}");
        }
    });
    wait_until_ready(addr).await;
    ServerGuard { addr, task }
}

/// Serves a bare router, for stub origins and gateways.
pub async fn spawn_router(router: Router) -> ServerGuard {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind listener");
    let addr = listener.local_addr().expect("listener addr");
    let task = tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router.into_make_service()).await {
            eprintln!("stub server exited: {error}");
        }
    });
    wait_until_ready(addr).await;
    ServerGuard { addr, task }
}

/// A stub origin that answers every path with the same HTML document.
pub async fn spawn_origin(html: &'static str) -> ServerGuard {
    spawn_router(Router::new().fallback(move || async move { Html(html) })).await
}

/// A stub inference gateway that answers every run with a fixed output.
pub async fn spawn_ai_gateway(output: Value) -> ServerGuard {
    let router = Router::new().route(
        "/run",
        post(move |Json(_request): Json<Value>| {
            let output = output.clone();
            async move { Json(json!({ "output": output })) }
        }),
    );
    spawn_router(router).await
}

/// A stub websocket feed. Each subscriber receives `events` as text frames
/// and then a close. Query strings of incoming subscriptions are recorded
/// into the returned list.
pub async fn spawn_feed(events: Vec<String>) -> (ServerGuard, Arc<Mutex<Vec<String>>>) {
    let queries: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let recorded = queries.clone();
    let events = Arc::new(events);
    let router = Router::new().route(
        "/subscribe",
        get(move |RawQuery(query): RawQuery, ws: WebSocketUpgrade| {
            let recorded = recorded.clone();
            let events = events.clone();
            async move {
                recorded
                    .lock()
                    .expect("queries lock")
                    .push(query.unwrap_or_default());
                ws.on_upgrade(move |mut socket| async move {
                    for event in events.iter() {
                        if socket.send(Message::Text(event.clone())).await.is_err() {
                            return;
                        }
                    }
                    // Give the consumer a beat before hanging up.
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    let _ = socket.send(Message::Close(None)).await;
                })
            }
        }),
    );
    let guard = spawn_router(router).await;
    (guard, queries)
}

async fn wait_until_ready(addr: SocketAddr) {
    for _ in 0..50 {
        if TcpStream::connect(addr).await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("server at {addr} never became ready");
}
