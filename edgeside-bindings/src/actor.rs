//! Stateful actors with private storage, alarms, and socket relays.
//!
//! Each activated actor is one tokio task draining a mailbox in order, so
//! handler bodies never overlap for the same actor id. Everything that can
//! happen to an actor (forwarded requests, attached sockets, inbound frames,
//! alarms) arrives as a mailbox envelope.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use axum::extract::ws::{Message as ServerMessage, WebSocket};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as ClientMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};
use uuid::Uuid;

const MAILBOX_CAPACITY: usize = 64;

/// Identifier of one actor within a namespace.
///
/// Name-derived ids are stable: the same name always addresses the same
/// actor. Ids only mean something within the namespace that produced them.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ActorId(String);

impl ActorId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of one socket attached to an actor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SocketId(u64);

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A text or binary frame, as actor socket handlers see it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SocketMessage {
    Text(String),
    Binary(Vec<u8>),
}

impl SocketMessage {
    /// The payload when the frame is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            SocketMessage::Text(text) => Some(text),
            SocketMessage::Binary(_) => None,
        }
    }
}

impl From<&str> for SocketMessage {
    fn from(text: &str) -> Self {
        SocketMessage::Text(text.to_owned())
    }
}

impl From<String> for SocketMessage {
    fn from(text: String) -> Self {
        SocketMessage::Text(text)
    }
}

impl From<Vec<u8>> for SocketMessage {
    fn from(bytes: Vec<u8>) -> Self {
        SocketMessage::Binary(bytes)
    }
}

/// A request forwarded to an actor through its stub.
#[derive(Clone, Debug)]
pub struct ActorRequest {
    pub method: String,
    pub path: String,
    pub body: Vec<u8>,
}

impl ActorRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: "GET".to_owned(),
            path: path.into(),
            body: Vec::new(),
        }
    }

    pub fn post(path: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            method: "POST".to_owned(),
            path: path.into(),
            body: body.into(),
        }
    }
}

/// What an actor's [`fetch`](Actor::fetch) returns.
#[derive(Clone, Debug)]
pub struct ActorResponse {
    pub status: u16,
    pub body: String,
}

impl ActorResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self::with_status(200, body)
    }

    pub fn with_status(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

impl IntoResponse for ActorResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, self.body).into_response()
    }
}

/// A single-threaded stateful actor.
///
/// Implementations provide [`fetch`](Actor::fetch); the socket and alarm
/// hooks default to no-ops.
#[async_trait]
pub trait Actor: Send + 'static {
    /// Handles a request forwarded through an [`ActorStub`].
    async fn fetch(&mut self, ctx: &mut ActorContext, request: ActorRequest) -> ActorResponse;

    /// Invoked when the pending alarm fires.
    async fn alarm(&mut self, ctx: &mut ActorContext) {
        let _ = ctx;
    }

    /// Invoked after a server socket has been attached to this actor.
    async fn socket_open(&mut self, ctx: &mut ActorContext, socket: SocketId) {
        let _ = (ctx, socket);
    }

    /// Invoked for each inbound frame on any of the actor's sockets.
    async fn socket_message(
        &mut self,
        ctx: &mut ActorContext,
        socket: SocketId,
        message: SocketMessage,
    ) {
        let _ = (ctx, socket, message);
    }

    /// Invoked once when a socket goes away: remote close or a failed write.
    /// The socket is already detached when this runs.
    async fn socket_close(&mut self, ctx: &mut ActorContext, socket: SocketId) {
        let _ = (ctx, socket);
    }

    /// Invoked once when a socket fails with a transport error. The socket is
    /// already detached when this runs.
    async fn socket_error(&mut self, ctx: &mut ActorContext, socket: SocketId, error: String) {
        let _ = (ctx, socket, error);
    }
}

/// Errors addressing actors and their sockets.
#[derive(Debug, Error)]
pub enum ActorError {
    #[error("actor `{0}` is stopped")]
    Stopped(ActorId),
    #[error("no attached socket {0}")]
    UnknownSocket(SocketId),
    #[error("socket {0} is closed")]
    SocketClosed(SocketId),
    #[error("could not connect to `{url}`: {message}")]
    Connect { url: String, message: String },
}

/// Private JSON key-value storage scoped to one actor.
#[derive(Debug, Default)]
pub struct ActorStorage {
    entries: HashMap<String, Value>,
}

impl ActorStorage {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn delete(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Stored keys in sorted order.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.keys().cloned().collect();
        keys.sort_unstable();
        keys
    }
}

enum Envelope {
    Fetch {
        request: ActorRequest,
        reply: oneshot::Sender<ActorResponse>,
    },
    Attach {
        socket: WebSocket,
    },
    Socket {
        id: SocketId,
        event: SocketEvent,
    },
    Alarm {
        generation: u64,
    },
}

enum SocketEvent {
    Message(SocketMessage),
    Closed,
    Error(String),
}

enum OutboundFrame {
    Message(SocketMessage),
    Close,
}

struct SocketHandle {
    frames: mpsc::UnboundedSender<OutboundFrame>,
}

struct AlarmEntry {
    at: DateTime<Utc>,
    generation: u64,
    task: JoinHandle<()>,
}

/// Capabilities available inside actor handlers: private storage, one
/// pending alarm, and the registry of attached sockets.
pub struct ActorContext {
    id: ActorId,
    pub storage: ActorStorage,
    sockets: HashMap<SocketId, SocketHandle>,
    next_socket: u64,
    alarm: Option<AlarmEntry>,
    alarm_generation: u64,
    mailbox: mpsc::Sender<Envelope>,
}

impl ActorContext {
    fn new(id: ActorId, mailbox: mpsc::Sender<Envelope>) -> Self {
        Self {
            id,
            storage: ActorStorage::default(),
            sockets: HashMap::new(),
            next_socket: 0,
            alarm: None,
            alarm_generation: 0,
            mailbox,
        }
    }

    pub fn id(&self) -> &ActorId {
        &self.id
    }

    /// Sends one frame to an attached socket.
    pub fn send(&mut self, socket: SocketId, message: impl Into<SocketMessage>) -> Result<(), ActorError> {
        let Some(handle) = self.sockets.get(&socket) else {
            return Err(ActorError::UnknownSocket(socket));
        };
        if handle
            .frames
            .send(OutboundFrame::Message(message.into()))
            .is_err()
        {
            // Write half is gone; the close still arrives via the mailbox so
            // it is observed exactly once.
            self.notify(socket, SocketEvent::Closed);
            return Err(ActorError::SocketClosed(socket));
        }
        Ok(())
    }

    /// Sends a frame to every attached socket, dropping any that fail.
    pub fn broadcast(&mut self, message: impl Into<SocketMessage>) {
        let message = message.into();
        let dead: Vec<SocketId> = self
            .sockets
            .iter()
            .filter(|(_, handle)| {
                handle
                    .frames
                    .send(OutboundFrame::Message(message.clone()))
                    .is_err()
            })
            .map(|(id, _)| *id)
            .collect();
        for socket in dead {
            warn!(actor = %self.id, %socket, "dropping unreachable socket");
            self.notify(socket, SocketEvent::Closed);
        }
    }

    /// Closes and detaches a socket. Self-initiated closes do not invoke
    /// [`Actor::socket_close`].
    pub fn close(&mut self, socket: SocketId) {
        if let Some(handle) = self.sockets.remove(&socket) {
            let _ = handle.frames.send(OutboundFrame::Close);
        }
    }

    /// Ids of all currently attached sockets, oldest first.
    pub fn sockets(&self) -> Vec<SocketId> {
        let mut ids: Vec<SocketId> = self.sockets.keys().copied().collect();
        ids.sort_unstable_by_key(|id| id.0);
        ids
    }

    /// Opens an outbound websocket connection and registers it like an
    /// attached socket. Inbound frames arrive via
    /// [`Actor::socket_message`]; no `socket_open` fires for outbound
    /// connections.
    pub async fn connect(&mut self, url: &str) -> Result<SocketId, ActorError> {
        let (stream, _response) =
            tokio_tungstenite::connect_async(url)
                .await
                .map_err(|source| ActorError::Connect {
                    url: url.to_owned(),
                    message: source.to_string(),
                })?;
        let id = self.next_socket_id();
        let frames = spawn_client_socket(id, stream, self.mailbox.clone());
        self.sockets.insert(id, SocketHandle { frames });
        Ok(id)
    }

    /// Schedules the actor's alarm, replacing any pending one.
    pub fn set_alarm(&mut self, at: DateTime<Utc>) {
        self.alarm_generation += 1;
        let generation = self.alarm_generation;
        if let Some(previous) = self.alarm.take() {
            previous.task.abort();
        }
        let mailbox = self.mailbox.clone();
        let task = tokio::spawn(async move {
            let wait = (at - Utc::now()).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;
            let _ = mailbox.send(Envelope::Alarm { generation }).await;
        });
        self.alarm = Some(AlarmEntry {
            at,
            generation,
            task,
        });
    }

    /// The pending alarm time, if one is set.
    pub fn current_alarm(&self) -> Option<DateTime<Utc>> {
        self.alarm.as_ref().map(|entry| entry.at)
    }

    /// Cancels the pending alarm.
    pub fn delete_alarm(&mut self) {
        if let Some(entry) = self.alarm.take() {
            entry.task.abort();
        }
    }

    fn next_socket_id(&mut self) -> SocketId {
        self.next_socket += 1;
        SocketId(self.next_socket)
    }

    fn attach(&mut self, socket: WebSocket) -> SocketId {
        let id = self.next_socket_id();
        let frames = spawn_server_socket(id, socket, self.mailbox.clone());
        self.sockets.insert(id, SocketHandle { frames });
        id
    }

    fn detach(&mut self, socket: SocketId) -> bool {
        self.sockets.remove(&socket).is_some()
    }

    fn notify(&self, socket: SocketId, event: SocketEvent) {
        if self
            .mailbox
            .try_send(Envelope::Socket { id: socket, event })
            .is_err()
        {
            warn!(actor = %self.id, %socket, "mailbox full, dropping socket event");
        }
    }
}

impl fmt::Debug for ActorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorContext")
            .field("id", &self.id)
            .field("sockets", &self.sockets.len())
            .field("alarm", &self.current_alarm())
            .finish()
    }
}

/// Lazily activates actors and hands out stubs addressing them by id.
#[derive(Clone)]
pub struct ActorNamespace {
    inner: Arc<NamespaceInner>,
}

struct NamespaceInner {
    factory: Box<dyn Fn() -> Box<dyn Actor> + Send + Sync>,
    actors: Mutex<HashMap<ActorId, mpsc::Sender<Envelope>>>,
}

impl ActorNamespace {
    /// Creates a namespace whose actors are built by `factory` on first use.
    pub fn new<A, F>(factory: F) -> Self
    where
        A: Actor,
        F: Fn() -> A + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(NamespaceInner {
                factory: Box::new(move || Box::new(factory())),
                actors: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Derives the stable id for `name`.
    pub fn id_from_name(&self, name: &str) -> ActorId {
        ActorId(name.to_owned())
    }

    /// A random id that never collides with named actors in practice.
    pub fn unique_id(&self) -> ActorId {
        ActorId(Uuid::new_v4().to_string())
    }

    /// Returns a stub for the actor with `id`, activating it on first use.
    pub fn get(&self, id: ActorId) -> ActorStub {
        let mut actors = self
            .inner
            .actors
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mailbox = actors
            .entry(id.clone())
            .or_insert_with(|| {
                debug!(actor = %id, "activating actor");
                let (sender, receiver) = mpsc::channel(MAILBOX_CAPACITY);
                let ctx = ActorContext::new(id.clone(), sender.clone());
                let actor = (self.inner.factory)();
                tokio::spawn(actor_task(actor, ctx, receiver));
                sender
            })
            .clone();
        ActorStub { id, mailbox }
    }
}

impl fmt::Debug for ActorNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let active = self
            .inner
            .actors
            .lock()
            .map(|actors| actors.len())
            .unwrap_or(0);
        f.debug_struct("ActorNamespace")
            .field("active", &active)
            .finish()
    }
}

/// Addressable handle to one actor.
#[derive(Clone, Debug)]
pub struct ActorStub {
    id: ActorId,
    mailbox: mpsc::Sender<Envelope>,
}

impl ActorStub {
    pub fn id(&self) -> &ActorId {
        &self.id
    }

    /// Forwards a request to the actor and awaits its response.
    pub async fn fetch(&self, request: ActorRequest) -> Result<ActorResponse, ActorError> {
        let (reply, response) = oneshot::channel();
        self.mailbox
            .send(Envelope::Fetch { request, reply })
            .await
            .map_err(|_| ActorError::Stopped(self.id.clone()))?;
        response
            .await
            .map_err(|_| ActorError::Stopped(self.id.clone()))
    }

    /// Hands an accepted server socket to the actor. The actor sees
    /// [`Actor::socket_open`] followed by one call per inbound frame.
    pub async fn attach(&self, socket: WebSocket) -> Result<(), ActorError> {
        self.mailbox
            .send(Envelope::Attach { socket })
            .await
            .map_err(|_| ActorError::Stopped(self.id.clone()))
    }
}

async fn actor_task(
    mut actor: Box<dyn Actor>,
    mut ctx: ActorContext,
    mut mailbox: mpsc::Receiver<Envelope>,
) {
    while let Some(envelope) = mailbox.recv().await {
        match envelope {
            Envelope::Fetch { request, reply } => {
                let response = actor.fetch(&mut ctx, request).await;
                let _ = reply.send(response);
            }
            Envelope::Attach { socket } => {
                let id = ctx.attach(socket);
                actor.socket_open(&mut ctx, id).await;
            }
            Envelope::Socket { id, event } => match event {
                SocketEvent::Message(message) => {
                    // Frames racing a local close are dropped with it.
                    if ctx.sockets.contains_key(&id) {
                        actor.socket_message(&mut ctx, id, message).await;
                    }
                }
                SocketEvent::Closed => {
                    if ctx.detach(id) {
                        actor.socket_close(&mut ctx, id).await;
                    }
                }
                SocketEvent::Error(error) => {
                    if ctx.detach(id) {
                        actor.socket_error(&mut ctx, id, error).await;
                    }
                }
            },
            Envelope::Alarm { generation } => {
                let current = ctx.alarm.as_ref().is_some_and(|entry| entry.generation == generation);
                if current {
                    ctx.alarm = None;
                    actor.alarm(&mut ctx).await;
                }
            }
        }
    }
    ctx.delete_alarm();
    debug!(actor = %ctx.id, "actor task stopped");
}

fn spawn_server_socket(
    id: SocketId,
    socket: WebSocket,
    mailbox: mpsc::Sender<Envelope>,
) -> mpsc::UnboundedSender<OutboundFrame> {
    let (frames, mut outbound) = mpsc::unbounded_channel();
    let (mut sink, mut stream) = socket.split();

    let writer_mailbox = mailbox.clone();
    tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            let message = match frame {
                OutboundFrame::Message(SocketMessage::Text(text)) => ServerMessage::Text(text),
                OutboundFrame::Message(SocketMessage::Binary(bytes)) => {
                    ServerMessage::Binary(bytes)
                }
                OutboundFrame::Close => {
                    let _ = sink.send(ServerMessage::Close(None)).await;
                    break;
                }
            };
            if let Err(error) = sink.send(message).await {
                debug!(socket = %id, %error, "server socket write failed");
                let _ = writer_mailbox
                    .send(Envelope::Socket {
                        id,
                        event: SocketEvent::Closed,
                    })
                    .await;
                break;
            }
        }
    });

    tokio::spawn(async move {
        while let Some(received) = stream.next().await {
            match received {
                Ok(ServerMessage::Text(text)) => {
                    let event = SocketEvent::Message(SocketMessage::Text(text));
                    if mailbox.send(Envelope::Socket { id, event }).await.is_err() {
                        return;
                    }
                }
                Ok(ServerMessage::Binary(bytes)) => {
                    let event = SocketEvent::Message(SocketMessage::Binary(bytes));
                    if mailbox.send(Envelope::Socket { id, event }).await.is_err() {
                        return;
                    }
                }
                Ok(ServerMessage::Ping(_)) | Ok(ServerMessage::Pong(_)) => {}
                Ok(ServerMessage::Close(_)) => break,
                Err(error) => {
                    let event = SocketEvent::Error(error.to_string());
                    let _ = mailbox.send(Envelope::Socket { id, event }).await;
                    return;
                }
            }
        }
        let event = SocketEvent::Closed;
        let _ = mailbox.send(Envelope::Socket { id, event }).await;
    });

    frames
}

fn spawn_client_socket(
    id: SocketId,
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mailbox: mpsc::Sender<Envelope>,
) -> mpsc::UnboundedSender<OutboundFrame> {
    let (frames, mut outbound) = mpsc::unbounded_channel();
    let (mut sink, mut stream) = socket.split();

    let writer_mailbox = mailbox.clone();
    tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            let message = match frame {
                OutboundFrame::Message(SocketMessage::Text(text)) => ClientMessage::Text(text),
                OutboundFrame::Message(SocketMessage::Binary(bytes)) => {
                    ClientMessage::Binary(bytes)
                }
                OutboundFrame::Close => {
                    let _ = sink.send(ClientMessage::Close(None)).await;
                    break;
                }
            };
            if let Err(error) = sink.send(message).await {
                debug!(socket = %id, %error, "client socket write failed");
                let _ = writer_mailbox
                    .send(Envelope::Socket {
                        id,
                        event: SocketEvent::Closed,
                    })
                    .await;
                break;
            }
        }
    });

    tokio::spawn(async move {
        while let Some(received) = stream.next().await {
            match received {
                Ok(ClientMessage::Text(text)) => {
                    let event = SocketEvent::Message(SocketMessage::Text(text));
                    if mailbox.send(Envelope::Socket { id, event }).await.is_err() {
                        return;
                    }
                }
                Ok(ClientMessage::Binary(bytes)) => {
                    let event = SocketEvent::Message(SocketMessage::Binary(bytes));
                    if mailbox.send(Envelope::Socket { id, event }).await.is_err() {
                        return;
                    }
                }
                Ok(ClientMessage::Ping(_)) | Ok(ClientMessage::Pong(_)) => {}
                Ok(ClientMessage::Close(_)) => break,
                Ok(ClientMessage::Frame(_)) => {}
                Err(error) => {
                    let event = SocketEvent::Error(error.to_string());
                    let _ = mailbox.send(Envelope::Socket { id, event }).await;
                    return;
                }
            }
        }
        let event = SocketEvent::Closed;
        let _ = mailbox.send(Envelope::Socket { id, event }).await;
    });

    frames
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use std::time::Duration;

    use super::*;

    struct Counter;

    #[async_trait]
    impl Actor for Counter {
        async fn fetch(&mut self, ctx: &mut ActorContext, request: ActorRequest) -> ActorResponse {
            match request.path.as_str() {
                "/bump" => {
                    let count = ctx
                        .storage
                        .get("count")
                        .and_then(Value::as_i64)
                        .unwrap_or(0)
                        + 1;
                    ctx.storage.put("count", json!(count));
                    ActorResponse::ok(count.to_string())
                }
                "/read" => {
                    let count = ctx
                        .storage
                        .get("count")
                        .and_then(Value::as_i64)
                        .unwrap_or(0);
                    ActorResponse::ok(count.to_string())
                }
                _ => ActorResponse::with_status(404, "Not Found"),
            }
        }
    }

    #[tokio::test]
    async fn same_name_addresses_the_same_actor() {
        let namespace = ActorNamespace::new(|| Counter);
        let first = namespace.get(namespace.id_from_name("a"));
        let second = namespace.get(namespace.id_from_name("a"));

        first
            .fetch(ActorRequest::get("/bump"))
            .await
            .expect("first bump");
        let response = second
            .fetch(ActorRequest::get("/bump"))
            .await
            .expect("second bump");
        assert_eq!(response.body, "2");
    }

    #[tokio::test]
    async fn different_names_are_isolated() {
        let namespace = ActorNamespace::new(|| Counter);
        let a = namespace.get(namespace.id_from_name("a"));
        let b = namespace.get(namespace.id_from_name("b"));

        a.fetch(ActorRequest::get("/bump")).await.expect("bump a");
        let response = b.fetch(ActorRequest::get("/read")).await.expect("read b");
        assert_eq!(response.body, "0");
    }

    #[tokio::test]
    async fn unknown_path_is_actor_level_404() {
        let namespace = ActorNamespace::new(|| Counter);
        let stub = namespace.get(namespace.unique_id());
        let response = stub
            .fetch(ActorRequest::get("/missing"))
            .await
            .expect("fetch");
        assert_eq!(response.status, 404);
    }

    struct Alarming;

    #[async_trait]
    impl Actor for Alarming {
        async fn fetch(&mut self, ctx: &mut ActorContext, request: ActorRequest) -> ActorResponse {
            match request.path.as_str() {
                "/arm" => {
                    ctx.set_alarm(Utc::now() + chrono::Duration::milliseconds(30));
                    ActorResponse::ok("armed")
                }
                "/arm-twice" => {
                    ctx.set_alarm(Utc::now() + chrono::Duration::milliseconds(250));
                    ctx.set_alarm(Utc::now() + chrono::Duration::milliseconds(30));
                    ActorResponse::ok("armed")
                }
                "/fired" => {
                    let fired = ctx
                        .storage
                        .get("fired")
                        .and_then(Value::as_i64)
                        .unwrap_or(0);
                    ActorResponse::ok(fired.to_string())
                }
                "/pending" => {
                    ActorResponse::ok(if ctx.current_alarm().is_some() { "yes" } else { "no" })
                }
                _ => ActorResponse::with_status(404, "Not Found"),
            }
        }

        async fn alarm(&mut self, ctx: &mut ActorContext) {
            let fired = ctx
                .storage
                .get("fired")
                .and_then(Value::as_i64)
                .unwrap_or(0);
            ctx.storage.put("fired", json!(fired + 1));
        }
    }

    #[tokio::test]
    async fn alarm_fires_once_and_clears() {
        let namespace = ActorNamespace::new(|| Alarming);
        let stub = namespace.get(namespace.id_from_name("clock"));

        stub.fetch(ActorRequest::get("/arm")).await.expect("arm");
        tokio::time::sleep(Duration::from_millis(120)).await;

        let fired = stub.fetch(ActorRequest::get("/fired")).await.expect("read");
        assert_eq!(fired.body, "1");
        let pending = stub
            .fetch(ActorRequest::get("/pending"))
            .await
            .expect("read");
        assert_eq!(pending.body, "no");
    }

    #[tokio::test]
    async fn rearming_replaces_the_pending_alarm() {
        let namespace = ActorNamespace::new(|| Alarming);
        let stub = namespace.get(namespace.id_from_name("clock"));

        stub.fetch(ActorRequest::get("/arm-twice"))
            .await
            .expect("arm");
        tokio::time::sleep(Duration::from_millis(400)).await;

        // The first schedule was replaced, so exactly one firing.
        let fired = stub.fetch(ActorRequest::get("/fired")).await.expect("read");
        assert_eq!(fired.body, "1");
    }

    struct Panicking;

    #[async_trait]
    impl Actor for Panicking {
        async fn fetch(&mut self, _ctx: &mut ActorContext, _request: ActorRequest) -> ActorResponse {
            panic!("actor crashed");
        }
    }

    #[tokio::test]
    async fn crashed_actor_reports_stopped() {
        let namespace = ActorNamespace::new(|| Panicking);
        let stub = namespace.get(namespace.id_from_name("doomed"));

        let first = stub.fetch(ActorRequest::get("/")).await;
        assert!(matches!(first, Err(ActorError::Stopped(_))));
        let second = stub.fetch(ActorRequest::get("/")).await;
        assert!(matches!(second, Err(ActorError::Stopped(_))));
    }

    #[test]
    fn storage_keys_are_sorted() {
        let mut storage = ActorStorage::default();
        storage.put("b", json!(2));
        storage.put("a", json!(1));
        assert_eq!(storage.keys(), vec!["a", "b"]);
        assert!(storage.delete("a"));
        assert!(!storage.delete("a"));
    }
}
