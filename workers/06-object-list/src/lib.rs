//! Per-name message lists backed by actors.
//!
//! Every list name addresses its own actor, so appends to one list never
//! interleave with another's. Messages live in the actor's private storage.

use async_trait::async_trait;
use axum::Router;
use axum::extract::Path;
use axum::http::StatusCode;
use axum::routing::get;
use serde_json::json;

use edgeside::{
    Actor, ActorContext, ActorNamespace, ActorRequest, ActorResponse, Worker, WorkerContext,
    WorkerManifest,
};

struct ListActor;

#[async_trait]
impl Actor for ListActor {
    async fn fetch(&mut self, ctx: &mut ActorContext, request: ActorRequest) -> ActorResponse {
        if let Some(message) = request.path.strip_prefix("/add/") {
            let mut messages = stored_messages(ctx);
            messages.push(message.to_owned());
            ctx.storage.put("messages", json!(messages));
            ActorResponse::ok("Message sent")
        } else if request.path == "/show" {
            let messages = stored_messages(ctx);
            if messages.is_empty() {
                ActorResponse::ok("No messages")
            } else {
                ActorResponse::ok(messages.join("\n"))
            }
        } else {
            ActorResponse::with_status(404, "Not Found")
        }
    }
}

fn stored_messages(ctx: &ActorContext) -> Vec<String> {
    ctx.storage
        .get("messages")
        .and_then(|value| serde_json::from_value(value.clone()).ok())
        .unwrap_or_default()
}

pub fn worker() -> edgeside::Result<Worker> {
    let manifest = WorkerManifest::from_str(include_str!("../worker.toml"))?;
    let router = Router::new()
        .route("/", get(missing_list))
        .route("/:list/add/:message", get(add_message))
        .route("/:list/show", get(show_messages))
        .fallback(not_found);
    Worker::builder()
        .manifest(manifest)
        .router(router)
        .actors("LISTS", ActorNamespace::new(|| ListActor))
        .build()
}

async fn missing_list() -> (StatusCode, &'static str) {
    (StatusCode::BAD_REQUEST, "List ID not specified")
}

async fn add_message(
    ctx: WorkerContext,
    Path((list, message)): Path<(String, String)>,
) -> Result<ActorResponse, (StatusCode, String)> {
    forward(&ctx, &list, &format!("/add/{message}")).await
}

async fn show_messages(
    ctx: WorkerContext,
    Path(list): Path<String>,
) -> Result<ActorResponse, (StatusCode, String)> {
    forward(&ctx, &list, "/show").await
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not Found")
}

async fn forward(
    ctx: &WorkerContext,
    list: &str,
    path: &str,
) -> Result<ActorResponse, (StatusCode, String)> {
    let lists = ctx.env().actors("LISTS").map_err(internal_error)?;
    let stub = lists.get(lists.id_from_name(list));
    stub.fetch(ActorRequest::get(path))
        .await
        .map_err(internal_error)
}

fn internal_error(err: impl std::fmt::Display) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}
