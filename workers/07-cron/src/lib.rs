//! A worker whose real work happens on a cron trigger, not on fetch.

use axum::Router;
use axum::routing::get;

use edgeside::{Worker, WorkerManifest};

pub fn worker() -> edgeside::Result<Worker> {
    let manifest = WorkerManifest::from_str(include_str!("../worker.toml"))?;
    let router = Router::new().route("/", get(root));
    Worker::builder()
        .manifest(manifest)
        .router(router)
        .on_scheduled(|event, _env| async move {
            tracing::info!(
                cron = %event.cron,
                at = %event.scheduled_for,
                "scheduled task has been executed"
            );
        })
        .build()
}

async fn root() -> &'static str {
    "This worker runs on a schedule - check the logs to see the cron trigger fire every minute"
}
