//! A server-rendered blog whose posts live in a SQL database.

use axum::extract::Path;
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use serde_json::Value;

use edgeside::{SqlRow, Worker, WorkerContext, WorkerManifest};

const LANDING_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Edgeside blog</title></head>
<body>
  <h1>Edgeside blog</h1>
  <p>A tiny blog rendered from SQL. Head over to <a href="/blog">/blog</a> for the post index.</p>
</body>
</html>
"#;

pub fn worker() -> edgeside::Result<Worker> {
    let manifest = WorkerManifest::from_str(include_str!("../worker.toml"))?;
    let router = Router::new()
        .route("/", get(landing))
        .route("/blog", get(post_index))
        .route("/blog/post/:id", get(post_page));
    let worker = Worker::builder().manifest(manifest).router(router).build()?;
    worker
        .env()
        .sql("DB")?
        .execute_batch(include_str!("../db_init.sql"))?;
    Ok(worker)
}

async fn landing() -> Html<&'static str> {
    Html(LANDING_PAGE)
}

async fn post_index(ctx: WorkerContext) -> Result<Html<String>, (StatusCode, String)> {
    let db = ctx.env().sql("DB").map_err(internal_error)?;
    let rows = db
        .prepare("SELECT id, title, pub_date FROM posts ORDER BY pub_date DESC")
        .all()
        .await
        .map_err(internal_error)?;

    let mut items = String::new();
    for row in &rows {
        let id = field_i64(row, "id");
        let title = escape_html(field_str(row, "title"));
        let date = escape_html(field_str(row, "pub_date"));
        items.push_str(&format!(
            "    <li><a href=\"/blog/post/{id}\">{title}</a> <small>{date}</small></li>\n"
        ));
    }

    Ok(Html(format!(
        "<!DOCTYPE html>\n<html>\n<head><title>Posts</title></head>\n<body>\n  \
         <h1>Posts</h1>\n  <ul>\n{items}  </ul>\n  <p><a href=\"/\">Home</a></p>\n</body>\n</html>\n"
    )))
}

async fn post_page(
    ctx: WorkerContext,
    Path(id): Path<i64>,
) -> Result<Html<String>, (StatusCode, String)> {
    let db = ctx.env().sql("DB").map_err(internal_error)?;
    let row = db
        .prepare("SELECT title, body, pub_date FROM posts WHERE id = ?")
        .bind(id)
        .first()
        .await
        .map_err(internal_error)?;

    let Some(row) = row else {
        return Err((StatusCode::NOT_FOUND, "No post with that id".to_owned()));
    };

    let title = escape_html(field_str(&row, "title"));
    let body = escape_html(field_str(&row, "body"));
    let date = escape_html(field_str(&row, "pub_date"));
    Ok(Html(format!(
        "<!DOCTYPE html>\n<html>\n<head><title>{title}</title></head>\n<body>\n  \
         <h1>{title}</h1>\n  <p><small>{date}</small></p>\n  <p>{body}</p>\n  \
         <p><a href=\"/blog\">Back to all posts</a></p>\n</body>\n</html>\n"
    )))
}

fn field_str<'a>(row: &'a SqlRow, key: &str) -> &'a str {
    row.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn field_i64(row: &SqlRow, key: &str) -> i64 {
    row.get(key).and_then(Value::as_i64).unwrap_or_default()
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

fn internal_error(err: impl std::fmt::Display) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_html_in_post_fields() {
        assert_eq!(escape_html("a < b & \"c\""), "a &lt; b &amp; &quot;c&quot;");
    }
}
