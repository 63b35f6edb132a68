//! Asks an inference gateway one canned question per request.

use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::Value;

use edgeside::{AiClient, AiRequest, Worker, WorkerContext, WorkerManifest};

const DEFAULT_GATEWAY: &str = "http://127.0.0.1:8787/run";
const MODEL: &str = "llama-3.1-8b-instruct";

pub fn worker() -> edgeside::Result<Worker> {
    worker_with(DEFAULT_GATEWAY)
}

/// Builds the worker against a specific gateway endpoint.
pub fn worker_with(gateway: &str) -> edgeside::Result<Worker> {
    let manifest = WorkerManifest::from_str(include_str!("../worker.toml"))?;
    let router = Router::new().route("/", get(ask));
    Worker::builder()
        .manifest(manifest)
        .router(router)
        .ai("AI", AiClient::new(gateway)?)
        .build()
}

async fn ask(ctx: WorkerContext) -> Result<Json<Value>, (StatusCode, String)> {
    let ai = ctx.env().ai("AI").map_err(internal_error)?;
    let request = AiRequest::input(
        "What is the origin of the phrase 'Hello, World'?",
    )
    .with_instructions("You are a concise assistant.");
    let response = ai
        .run(MODEL, request)
        .await
        .map_err(|err| (StatusCode::BAD_GATEWAY, err.to_string()))?;
    Ok(Json(response.output))
}

fn internal_error(err: impl std::fmt::Display) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}
