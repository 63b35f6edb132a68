//! Outbound HTTP fetch.

use std::time::Duration;

use reqwest::Client;
use thiserror::Error;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for workers that pull content from an origin.
#[derive(Clone, Debug)]
pub struct FetchClient {
    http: Client,
}

/// A buffered upstream response.
#[derive(Clone, Debug)]
pub struct FetchedPage {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("could not build http client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("fetch failed: {0}")]
    Transport(#[source] reqwest::Error),
}

impl FetchClient {
    pub fn new() -> Result<Self, FetchError> {
        let http = Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self { http })
    }

    /// Fetches `url` and buffers the whole body as text.
    pub async fn get(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(FetchError::Transport)?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let body = response.text().await.map_err(FetchError::Transport)?;
        Ok(FetchedPage {
            status,
            content_type,
            body,
        })
    }
}
