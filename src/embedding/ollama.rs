//! Ollama embeddings over its local HTTP API.

use super::Embedder;
use crate::error::{Result, SvarError};
use crate::openai::DEFAULT_TIMEOUT;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

pub(crate) const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Embedder backed by an Ollama server (`POST /api/embed`).
pub struct OllamaEmbedder {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbedder {
    pub fn new(base_url: &str, model: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| SvarError::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: format!("{}/api/embed", base_url.trim_end_matches('/')),
            model: model.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// 429 and 5xx may clear up; any other failure status will not.
fn classify_status(status: StatusCode, body: String) -> SvarError {
    let message = format!("{}: {}", status, body);
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        SvarError::unavailable("embedding", message)
    } else {
        SvarError::rejected("embedding", message)
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    #[instrument(skip(self, texts), fields(count = texts.len()))]
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .post(&self.endpoint)
            .json(&EmbedRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .map_err(|e| SvarError::unavailable("embedding", e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(classify_status(status, body));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| SvarError::Embedding(format!("Malformed embedding response: {}", e)))?;

        debug!("Received {} embeddings", parsed.embeddings.len());
        Ok(parsed.embeddings)
    }

    fn model(&self) -> &str {
        &self.model
    }
}
