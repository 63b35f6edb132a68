//! Writes a value into a KV namespace and reads it straight back.

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;

use edgeside::{Worker, WorkerContext, WorkerManifest};

pub fn worker() -> edgeside::Result<Worker> {
    let manifest = WorkerManifest::from_str(include_str!("../worker.toml"))?;
    let router = Router::new().route("/", get(write_then_read));
    Worker::builder().manifest(manifest).router(router).build()
}

async fn write_then_read(ctx: WorkerContext) -> Result<String, (StatusCode, String)> {
    let kv = ctx.env().kv("FOO").map_err(internal_error)?;
    kv.put("bar", "baz");
    let value = kv
        .get_text("bar")
        .map_err(internal_error)?
        .unwrap_or_default();
    Ok(value)
}

fn internal_error(err: impl std::fmt::Display) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}
