//! Serves a random quote from a seeded SQL database.

use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};

use edgeside::{SqlRow, Worker, WorkerContext, WorkerManifest};

pub fn worker() -> edgeside::Result<Worker> {
    let manifest = WorkerManifest::from_str(include_str!("../worker.toml"))?;
    let router = Router::new().route("/", get(random_quote));
    let worker = Worker::builder().manifest(manifest).router(router).build()?;
    worker
        .env()
        .sql("DB")?
        .execute_batch(include_str!("../db_init.sql"))?;
    Ok(worker)
}

async fn random_quote(ctx: WorkerContext) -> Result<Json<SqlRow>, (StatusCode, String)> {
    let db = ctx.env().sql("DB").map_err(internal_error)?;
    let row = db
        .prepare("SELECT quote, author FROM qtable ORDER BY RANDOM() LIMIT 1")
        .first()
        .await
        .map_err(internal_error)?;
    match row {
        Some(row) => Ok(Json(row)),
        None => Err((StatusCode::NOT_FOUND, "no quotes seeded".to_owned())),
    }
}

fn internal_error(err: impl std::fmt::Display) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}
