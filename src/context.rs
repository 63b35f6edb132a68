use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use edgeside_bindings::Env;

/// Header that carries pre-built request metadata as JSON. Set by fronting
/// proxies or test harnesses that want to pin the metadata a handler sees.
const METADATA_HEADER: &str = "x-edgeside-metadata";

/// Request-scoped handle that exposes request metadata plus the worker's env.
#[derive(Clone, Debug)]
pub struct WorkerContext {
    metadata: RequestMetadata,
    env: Env,
}

impl WorkerContext {
    /// Returns the request metadata parsed from headers.
    pub fn metadata(&self) -> &RequestMetadata {
        &self.metadata
    }

    /// Returns the env holding the worker's bindings.
    pub fn env(&self) -> &Env {
        &self.env
    }
}

/// Per-request metadata assembled from standard proxy headers.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestMetadata {
    pub request_id: Option<String>,
    pub client_ip: Option<String>,
    pub host: Option<String>,
    pub scheme: Option<String>,
    pub method: String,
    pub path: String,
    pub raw_url: Option<String>,
}

impl Default for RequestMetadata {
    fn default() -> Self {
        Self {
            request_id: None,
            client_ip: None,
            host: None,
            scheme: None,
            method: "GET".to_owned(),
            path: "/".to_owned(),
            raw_url: None,
        }
    }
}

impl RequestMetadata {
    /// Builds metadata from either the override header or individual headers.
    fn from_parts(parts: &Parts) -> Self {
        if let Some(metadata) = Self::from_metadata_header(parts) {
            return metadata;
        }

        let headers = &parts.headers;
        let request_id = headers
            .get("x-request-id")
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_owned());
        let client_ip = headers
            .get("x-forwarded-for")
            .or_else(|| headers.get("x-real-ip"))
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_owned());
        let host = headers
            .get(axum::http::header::HOST)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_owned());

        let method = parts.method.to_string();
        let path_and_query = parts.uri.path_and_query().map(|pq| pq.as_str().to_owned());
        let path = path_and_query.unwrap_or_else(|| parts.uri.path().to_owned());
        let raw_url = Some(parts.uri.to_string()).filter(|value| !value.is_empty());
        let scheme = parts.uri.scheme_str().map(|value| value.to_owned());

        Self {
            request_id,
            client_ip,
            host,
            scheme,
            method,
            path,
            raw_url,
        }
    }

    fn from_metadata_header(parts: &Parts) -> Option<Self> {
        let header = parts.headers.get(METADATA_HEADER)?;
        let raw = header.to_str().ok()?;
        serde_json::from_str(raw).ok()
    }
}

/// Errors emitted when a handler requests [`WorkerContext`] but extensions were not set up.
#[derive(Debug, Error)]
pub enum WorkerContextRejection {
    #[error("worker env missing from request extensions")]
    MissingEnv,
}

impl IntoResponse for WorkerContextRejection {
    fn into_response(self) -> Response {
        let status = StatusCode::INTERNAL_SERVER_ERROR;
        let message = self.to_string();
        (status, message).into_response()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for WorkerContext
where
    S: Send + Sync,
{
    type Rejection = WorkerContextRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let env = parts
            .extensions
            .get::<Env>()
            .cloned()
            .ok_or(WorkerContextRejection::MissingEnv)?;

        let metadata = RequestMetadata::from_parts(parts);

        Ok(Self { metadata, env })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[test]
    fn metadata_defaults_to_headers() {
        let request = Request::builder()
            .method("GET")
            .uri("https://example.com/foo?bar=baz")
            .header("x-request-id", "req-123")
            .header("x-forwarded-for", "203.0.113.1")
            .body(())
            .unwrap();

        let (parts, _) = request.into_parts();
        let metadata = RequestMetadata::from_parts(&parts);

        assert_eq!(metadata.request_id.as_deref(), Some("req-123"));
        assert_eq!(metadata.client_ip.as_deref(), Some("203.0.113.1"));
        assert_eq!(metadata.method, "GET");
        assert_eq!(metadata.path, "/foo?bar=baz");
        assert_eq!(metadata.scheme.as_deref(), Some("https"));
    }

    #[test]
    fn real_ip_header_is_a_fallback() {
        let request = Request::builder()
            .uri("/")
            .header("x-real-ip", "198.51.100.7")
            .body(())
            .unwrap();

        let (parts, _) = request.into_parts();
        let metadata = RequestMetadata::from_parts(&parts);

        assert_eq!(metadata.client_ip.as_deref(), Some("198.51.100.7"));
    }

    #[test]
    fn metadata_header_overrides_values() {
        let mut metadata = RequestMetadata::default();
        metadata.request_id = Some("abc".into());
        metadata.client_ip = Some("203.0.113.9".into());
        metadata.host = Some("example.com".into());
        metadata.scheme = Some("https".into());
        metadata.method = "POST".into();
        metadata.path = "/foo?bar=baz".into();
        metadata.raw_url = Some("https://example.com/foo?bar=baz".into());

        let metadata_header = serde_json::to_string(&metadata).unwrap();
        let request = Request::builder()
            .method("POST")
            .uri("https://placeholder.invalid/")
            .header(METADATA_HEADER, metadata_header)
            .body(())
            .unwrap();

        let (parts, _) = request.into_parts();
        let parsed = RequestMetadata::from_parts(&parts);

        assert_eq!(parsed.request_id, metadata.request_id);
        assert_eq!(parsed.client_ip, metadata.client_ip);
        assert_eq!(parsed.path, metadata.path);
        assert_eq!(parsed.raw_url, metadata.raw_url);
    }
}
