//! Static asset catalogs.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};

/// An immutable set of static files, looked up by exact request path.
#[derive(Clone, Debug, Default)]
pub struct AssetCatalog {
    entries: Arc<BTreeMap<String, Asset>>,
}

/// One file in an [`AssetCatalog`].
#[derive(Clone, Debug)]
pub struct Asset {
    pub content_type: String,
    pub body: Bytes,
}

impl AssetCatalog {
    pub fn builder() -> AssetCatalogBuilder {
        AssetCatalogBuilder::default()
    }

    /// Fetches the asset registered at `path`, if any.
    pub fn fetch(&self, path: &str) -> Option<Asset> {
        self.entries.get(path).cloned()
    }

    /// Registered paths in sorted order.
    pub fn paths(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

#[derive(Debug, Default)]
pub struct AssetCatalogBuilder {
    entries: BTreeMap<String, Asset>,
}

impl AssetCatalogBuilder {
    /// Registers `body` at `path`, inferring the content type from the path
    /// extension.
    pub fn asset(self, path: impl Into<String>, body: impl Into<Bytes>) -> Self {
        let path = path.into();
        let content_type = content_type_for(&path).to_owned();
        self.entry(path, content_type, body.into())
    }

    /// Registers `body` at `path` with an explicit content type.
    pub fn asset_with_type(
        self,
        path: impl Into<String>,
        content_type: impl Into<String>,
        body: impl Into<Bytes>,
    ) -> Self {
        self.entry(path.into(), content_type.into(), body.into())
    }

    pub fn build(self) -> AssetCatalog {
        AssetCatalog {
            entries: Arc::new(self.entries),
        }
    }

    fn entry(mut self, path: String, content_type: String, body: Bytes) -> Self {
        self.entries.insert(path, Asset { content_type, body });
        self
    }
}

/// Returns the content type implied by `path`'s extension.
///
/// Unknown extensions fall back to `application/octet-stream`.
pub fn content_type_for(path: &str) -> &'static str {
    match path.rsplit_once('.').map(|(_, extension)| extension) {
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js") => "text/javascript; charset=utf-8",
        Some("json") => "application/json",
        Some("txt") => "text/plain; charset=utf-8",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("ico") => "image/vnd.microsoft.icon",
        _ => "application/octet-stream",
    }
}

impl IntoResponse for Asset {
    fn into_response(self) -> Response {
        match HeaderValue::from_str(&self.content_type) {
            Ok(value) => ([(header::CONTENT_TYPE, value)], self.body).into_response(),
            Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_returns_registered_asset() {
        let catalog = AssetCatalog::builder()
            .asset("/style.css", "body { margin: 0; }")
            .build();
        let asset = catalog.fetch("/style.css").expect("asset");
        assert_eq!(asset.content_type, "text/css; charset=utf-8");
        assert_eq!(&asset.body[..], b"body { margin: 0; }");
    }

    #[test]
    fn fetch_misses_unregistered_path() {
        let catalog = AssetCatalog::builder().asset("/a.txt", "a").build();
        assert!(catalog.fetch("/b.txt").is_none());
    }

    #[test]
    fn explicit_content_type_wins() {
        let catalog = AssetCatalog::builder()
            .asset_with_type("/data.bin", "application/wasm", vec![0u8])
            .build();
        let asset = catalog.fetch("/data.bin").expect("asset");
        assert_eq!(asset.content_type, "application/wasm");
    }

    #[test]
    fn content_types_follow_extension() {
        assert_eq!(content_type_for("/index.html"), "text/html; charset=utf-8");
        assert_eq!(content_type_for("/script.js"), "text/javascript; charset=utf-8");
        assert_eq!(content_type_for("/image.svg"), "image/svg+xml");
        assert_eq!(content_type_for("/favicon.ico"), "image/vnd.microsoft.icon");
        assert_eq!(content_type_for("/notes.txt"), "text/plain; charset=utf-8");
        assert_eq!(content_type_for("/blob"), "application/octet-stream");
    }
}
