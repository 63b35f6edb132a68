//! Launches a small diamond-shaped workflow and exposes its status.
//!
//! Two independent steps sleep for a random slice of time; a third waits on
//! both and summarizes their outputs.

use std::time::Duration;

use axum::extract::Path;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use rand::Rng;
use serde_json::json;

use edgeside::{
    RetryPolicy, Worker, WorkerContext, WorkerManifest, Workflow, WorkflowSpec, WorkflowStatus,
};

pub fn worker() -> edgeside::Result<Worker> {
    let manifest = WorkerManifest::from_str(include_str!("../worker.toml"))?;
    let spec = WorkflowSpec::builder("dag")
        .step("dependency-1", |_input| async {
            let pause = rand::thread_rng().gen_range(100..=300);
            tracing::info!(pause_ms = pause, "executing dependency-1");
            tokio::time::sleep(Duration::from_millis(pause)).await;
            Ok(json!({ "step": "dependency-1", "slept_ms": pause }))
        })
        .step("dependency-2", |_input| async {
            let pause = rand::thread_rng().gen_range(100..=300);
            tracing::info!(pause_ms = pause, "executing dependency-2");
            tokio::time::sleep(Duration::from_millis(pause)).await;
            Ok(json!({ "step": "dependency-2", "slept_ms": pause }))
        })
        .step_after(
            "summarize",
            &["dependency-1", "dependency-2"],
            |input| async move {
                let first = input
                    .dependency("dependency-1")
                    .and_then(|value| value["slept_ms"].as_u64())
                    .unwrap_or_default();
                let second = input
                    .dependency("dependency-2")
                    .and_then(|value| value["slept_ms"].as_u64())
                    .unwrap_or_default();
                tracing::info!("both dependencies finished");
                Ok(json!({ "total_slept_ms": first + second }))
            },
        )
        .retry("summarize", RetryPolicy::attempts(3))
        .build()?;

    let router = Router::new()
        .route("/", get(usage))
        .route("/start", get(start))
        .route("/status/:id", get(status));
    Worker::builder()
        .manifest(manifest)
        .router(router)
        .workflow("MY_WORKFLOW", Workflow::new(spec))
        .build()
}

async fn usage() -> &'static str {
    "Use /start to kick off a workflow. Use /status/<id> to inspect it."
}

async fn start(ctx: WorkerContext) -> Result<String, (StatusCode, String)> {
    let workflow = ctx.env().workflow("MY_WORKFLOW").map_err(internal_error)?;
    let instance = workflow.create();
    Ok(format!(
        "Just kicked off a workflow with ID: {}",
        instance.id()
    ))
}

async fn status(
    ctx: WorkerContext,
    Path(id): Path<String>,
) -> Result<Json<WorkflowStatus>, (StatusCode, String)> {
    let workflow = ctx.env().workflow("MY_WORKFLOW").map_err(internal_error)?;
    match workflow.get(&id) {
        Some(instance) => Ok(Json(instance.status())),
        None => Err((
            StatusCode::NOT_FOUND,
            format!("no workflow instance with ID {id}"),
        )),
    }
}

fn internal_error(err: impl std::fmt::Display) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}
