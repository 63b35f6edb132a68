//! Inference gateway client.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

const INFERENCE_TIMEOUT: Duration = Duration::from_secs(60);

/// Client for a local inference gateway speaking a one-shot JSON protocol.
///
/// The gateway receives `{ "model", "instructions"?, "input" }` over POST and
/// answers `{ "output": ... }`. Model routing and token accounting are the
/// gateway's business; the binding just moves the payloads.
#[derive(Clone, Debug)]
pub struct AiClient {
    http: Client,
    endpoint: String,
}

/// Input for one inference call.
#[derive(Clone, Debug)]
pub struct AiRequest {
    pub instructions: Option<String>,
    pub input: String,
}

impl AiRequest {
    pub fn input(text: impl Into<String>) -> Self {
        Self {
            instructions: None,
            input: text.into(),
        }
    }

    /// Adds a system-style instruction preamble.
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }
}

/// Body returned by the gateway.
#[derive(Clone, Debug, Deserialize)]
pub struct AiOutput {
    pub output: Value,
}

#[derive(Debug, Error)]
pub enum AiError {
    #[error("could not build http client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("inference request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("inference gateway returned status {status}")]
    Status { status: u16 },
    #[error("could not decode gateway response: {0}")]
    Decode(#[source] serde_json::Error),
}

#[derive(Serialize)]
struct InferencePayload<'a> {
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<&'a str>,
    input: &'a str,
}

impl AiClient {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, AiError> {
        let http = Client::builder()
            .timeout(INFERENCE_TIMEOUT)
            .build()
            .map_err(AiError::Client)?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Runs one inference call against `model`.
    pub async fn run(&self, model: &str, request: AiRequest) -> Result<AiOutput, AiError> {
        let payload = InferencePayload {
            model,
            instructions: request.instructions.as_deref(),
            input: &request.input,
        };
        let response = self
            .http
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(AiError::Transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(AiError::Status {
                status: status.as_u16(),
            });
        }
        let body = response.text().await.map_err(AiError::Transport)?;
        serde_json::from_str(&body).map_err(AiError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_omits_missing_instructions() {
        let payload = InferencePayload {
            model: "m",
            instructions: None,
            input: "hi",
        };
        let encoded = serde_json::to_string(&payload).expect("encode");
        assert_eq!(encoded, r#"{"model":"m","input":"hi"}"#);
    }

    #[test]
    fn payload_includes_instructions_when_set() {
        let request = AiRequest::input("hi").with_instructions("Be brief.");
        let payload = InferencePayload {
            model: "m",
            instructions: request.instructions.as_deref(),
            input: &request.input,
        };
        let encoded = serde_json::to_string(&payload).expect("encode");
        assert!(encoded.contains(r#""instructions":"Be brief.""#));
    }
}
