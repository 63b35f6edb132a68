//! A long-lived websocket feed consumer hosted in a single actor.
//!
//! The first request activates the actor, which connects to the feed and
//! arms a keepalive alarm. The alarm re-fires every minute and reconnects
//! whenever the socket has dropped, resuming from the last event timestamp
//! so no events are skipped across reconnects.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::Router;
use axum::http::{StatusCode, Uri};
use chrono::Utc;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use edgeside::{
    Actor, ActorContext, ActorNamespace, ActorRequest, ActorResponse, SocketId, SocketMessage,
    Worker, WorkerContext, WorkerManifest,
};

const DEFAULT_FEED: &str = "wss://feed.example.com/subscribe?kinds=post";
const KEEPALIVE_SECONDS: i64 = 60;

struct FeedConsumer {
    feed_url: String,
    socket: Option<SocketId>,
    last_logged: Option<Instant>,
}

impl FeedConsumer {
    fn new(feed_url: String) -> Self {
        Self {
            feed_url,
            socket: None,
            last_logged: None,
        }
    }

    /// Connects to the feed, resuming from the stored cursor when one exists.
    async fn connect_to_feed(&mut self, ctx: &mut ActorContext) {
        let mut url = self.feed_url.clone();
        if let Some(cursor) = ctx
            .storage
            .get("last_event_timestamp")
            .and_then(Value::as_u64)
        {
            let separator = if url.contains('?') { '&' } else { '?' };
            url.push(separator);
            url.push_str(&format!("cursor={cursor}"));
        }
        match ctx.connect(&url).await {
            Ok(socket) => {
                info!(%url, "connected to feed");
                self.socket = Some(socket);
            }
            Err(error) => warn!(%error, "feed connection failed"),
        }
    }

    fn schedule_keepalive(&self, ctx: &mut ActorContext) {
        ctx.set_alarm(Utc::now() + chrono::Duration::seconds(KEEPALIVE_SECONDS));
    }
}

#[async_trait]
impl Actor for FeedConsumer {
    async fn fetch(&mut self, ctx: &mut ActorContext, request: ActorRequest) -> ActorResponse {
        if self.socket.is_none() {
            self.connect_to_feed(ctx).await;
            self.schedule_keepalive(ctx);
        }
        match request.path.as_str() {
            "/status" => {
                let status = if self.socket.is_some() {
                    "connected"
                } else {
                    "disconnected"
                };
                ActorResponse::ok(format!("Feed status: {status}"))
            }
            _ => ActorResponse::ok(
                "Consuming the feed in the background. Available endpoints: /status",
            ),
        }
    }

    async fn alarm(&mut self, ctx: &mut ActorContext) {
        debug!("keepalive alarm fired");
        if self.socket.is_none() {
            info!("feed disconnected, reconnecting");
            self.connect_to_feed(ctx).await;
        }
        self.schedule_keepalive(ctx);
    }

    async fn socket_message(
        &mut self,
        ctx: &mut ActorContext,
        socket: SocketId,
        message: SocketMessage,
    ) {
        if Some(socket) != self.socket {
            return;
        }
        let Some(text) = message.as_text() else {
            return;
        };
        let Ok(event) = serde_json::from_str::<Value>(text) else {
            debug!("skipping malformed feed event");
            return;
        };
        if let Some(time_us) = event.get("time_us").and_then(Value::as_u64) {
            ctx.storage.put("last_event_timestamp", json!(time_us));
        }

        // At most one post per second makes it into the log.
        let now = Instant::now();
        let recently_logged = self
            .last_logged
            .is_some_and(|at| now.duration_since(at) < Duration::from_secs(1));
        if recently_logged {
            return;
        }
        if let Some(post) = event.pointer("/commit/record/text").and_then(Value::as_str) {
            info!(text = %truncate(post, 120), "feed post");
            self.last_logged = Some(now);
        }
    }

    async fn socket_close(&mut self, _ctx: &mut ActorContext, socket: SocketId) {
        if Some(socket) == self.socket {
            info!("feed socket closed");
            self.socket = None;
        }
    }

    async fn socket_error(&mut self, _ctx: &mut ActorContext, socket: SocketId, error: String) {
        if Some(socket) == self.socket {
            warn!(%error, "feed socket failed");
            self.socket = None;
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

pub fn worker() -> edgeside::Result<Worker> {
    worker_with(DEFAULT_FEED)
}

/// Builds the worker against a specific feed endpoint.
pub fn worker_with(feed_url: &str) -> edgeside::Result<Worker> {
    let manifest = WorkerManifest::from_str(include_str!("../worker.toml"))?;
    let feed_url = feed_url.to_owned();
    let router = Router::new().fallback(forward);
    Worker::builder()
        .manifest(manifest)
        .router(router)
        .actors(
            "FEED",
            ActorNamespace::new(move || FeedConsumer::new(feed_url.clone())),
        )
        .build()
}

async fn forward(ctx: WorkerContext, uri: Uri) -> Result<ActorResponse, (StatusCode, String)> {
    let feed = ctx.env().actors("FEED").map_err(internal_error)?;
    let stub = feed.get(feed.id_from_name("consumer"));
    stub.fetch(ActorRequest::get(uri.path()))
        .await
        .map_err(internal_error)
}

fn internal_error(err: impl std::fmt::Display) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}
