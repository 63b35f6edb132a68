//! A small typed JSON API: path params, query params, request bodies, and an
//! env var lookup.

use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use edgeside::{Worker, WorkerContext, WorkerManifest};

pub fn worker() -> edgeside::Result<Worker> {
    let manifest = WorkerManifest::from_str(include_str!("../worker.toml"))?;
    let router = Router::new()
        .route("/", get(root))
        .route("/hi/:name", get(greet))
        .route("/env", get(show_env))
        .route("/items", post(create_item))
        .route("/items/:id", get(read_item).put(update_item));
    Worker::builder().manifest(manifest).router(router).build()
}

#[derive(Debug, Deserialize, Serialize)]
struct Item {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tax: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct UpdateParams {
    q: Option<String>,
}

async fn root() -> Json<Value> {
    Json(json!({
        "message": "This is an example of a typed JSON API - go to /hi/<name> for a greeting"
    }))
}

async fn greet(Path(name): Path<String>) -> Json<Value> {
    Json(json!({ "message": format!("Hello, {name}!") }))
}

async fn show_env(ctx: WorkerContext) -> Result<Json<Value>, (StatusCode, String)> {
    let message = ctx.env().var("MESSAGE").map_err(internal_error)?;
    Ok(Json(json!({
        "message": format!("Here is an example of getting an environment variable: {message}")
    })))
}

async fn create_item(Json(item): Json<Item>) -> Json<Item> {
    Json(item)
}

async fn read_item(Path(id): Path<u64>) -> Json<Value> {
    Json(json!({ "item_id": id }))
}

async fn update_item(
    Path(id): Path<u64>,
    Query(params): Query<UpdateParams>,
    Json(item): Json<Item>,
) -> Json<Value> {
    let mut result = json!({
        "item_id": id,
        "name": item.name,
        "description": item.description,
        "price": item.price,
        "tax": item.tax,
    });
    if let Some(q) = params.q {
        result["q"] = json!(q);
    }
    Json(result)
}

fn internal_error(err: impl std::fmt::Display) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}
