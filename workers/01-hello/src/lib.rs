//! The smallest possible worker: one route, one greeting.

use axum::Router;
use axum::routing::get;

use edgeside::{Worker, WorkerManifest};

pub fn worker() -> edgeside::Result<Worker> {
    let manifest = WorkerManifest::from_str(include_str!("../worker.toml"))?;
    let router = Router::new().route("/", get(hello));
    Worker::builder().manifest(manifest).router(router).build()
}

async fn hello() -> &'static str {
    "Hello world!"
}
