//! Serves a small static site out of an asset catalog binding.

use axum::Router;
use axum::http::{StatusCode, Uri};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;

use edgeside::{AssetCatalog, Worker, WorkerContext, WorkerManifest};

const INDEX_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <title>Static Assets</title>
    <link rel="stylesheet" href="/style.css">
    <link rel="icon" href="/favicon.ico">
</head>
<body>
    <h1>Static Assets</h1>
    <p>This worker serves a handful of files with their proper content types:</p>
    <ul>
        <li><a href="/style.css">style.css</a></li>
        <li><a href="/script.js">script.js</a></li>
        <li><a href="/image.svg">image.svg</a></li>
        <li><a href="/favicon.ico">favicon.ico</a></li>
    </ul>
    <img src="/image.svg" alt="demo" width="120" height="120">
    <script src="/script.js"></script>
</body>
</html>
"#;

const STYLE_CSS: &str = r#"body {
    font-family: sans-serif;
    margin: 2rem auto;
    max-width: 40rem;
    color: #24292f;
}

h1 {
    border-bottom: 2px solid #2e5cb8;
    padding-bottom: 0.3rem;
}

a {
    color: #2e5cb8;
}
"#;

const SCRIPT_JS: &str = r#"document.addEventListener("DOMContentLoaded", () => {
    console.log("static assets demo loaded");
});
"#;

const IMAGE_SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 120 120">
  <rect width="120" height="120" rx="12" fill="#2e5cb8"/>
  <circle cx="60" cy="60" r="34" fill="#ffffff"/>
  <circle cx="60" cy="60" r="16" fill="#f5a623"/>
</svg>
"##;

// A 1x1 32-bit icon: ICONDIR, one ICONDIRENTRY, a BITMAPINFOHEADER, one
// BGRA pixel, and a padded AND mask.
static FAVICON_ICO: [u8; 70] = [
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, // ICONDIR: one image
    0x01, 0x01, 0x00, 0x00, 0x01, 0x00, 0x20, 0x00, // 1x1, 32bpp
    0x30, 0x00, 0x00, 0x00, 0x16, 0x00, 0x00, 0x00, // 48 bytes at offset 22
    0x28, 0x00, 0x00, 0x00, // BITMAPINFOHEADER
    0x01, 0x00, 0x00, 0x00, // width 1
    0x02, 0x00, 0x00, 0x00, // height 2 (XOR + AND)
    0x01, 0x00, 0x20, 0x00, // 1 plane, 32bpp
    0x00, 0x00, 0x00, 0x00, // no compression
    0x08, 0x00, 0x00, 0x00, // image data size
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // resolution
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // palette
    0xb8, 0x5c, 0x2e, 0xff, // one BGRA pixel
    0x00, 0x00, 0x00, 0x00, // AND mask row
];

pub fn worker() -> edgeside::Result<Worker> {
    let manifest = WorkerManifest::from_str(include_str!("../worker.toml"))?;
    let assets = AssetCatalog::builder()
        .asset("/style.css", STYLE_CSS)
        .asset("/script.js", SCRIPT_JS)
        .asset("/image.svg", IMAGE_SVG)
        .asset("/favicon.ico", &FAVICON_ICO[..])
        .build();
    let router = Router::new()
        .route("/", get(index))
        .route("/index.html", get(index))
        .fallback(serve_asset);
    Worker::builder()
        .manifest(manifest)
        .router(router)
        .assets("ASSETS", assets)
        .build()
}

async fn index() -> Html<&'static str> {
    Html(INDEX_PAGE)
}

async fn serve_asset(ctx: WorkerContext, uri: Uri) -> Response {
    let catalog = match ctx.env().assets("ASSETS") {
        Ok(catalog) => catalog,
        Err(err) => return (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    };
    match catalog.fetch(uri.path()) {
        Some(asset) => asset.into_response(),
        None => (StatusCode::NOT_FOUND, "Not Found").into_response(),
    }
}
