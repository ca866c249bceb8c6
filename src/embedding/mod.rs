//! Embedding generation for semantic search and retrieval.
//!
//! Backends implement [`Embedder`] and make one request per call. The
//! [`EmbeddingGateway`] in front of them owns batching, bounded concurrency,
//! retries, and dimension checks, so every caller sees the same guarantees.

mod ollama;
mod openai;

pub use ollama::OllamaEmbedder;
pub use openai::OpenAIEmbedder;

use crate::config::{EmbeddingProvider, EmbeddingSettings};
use crate::error::{Result, SvarError};
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::{Arc, OnceLock};
use tracing::{debug, instrument};

/// Trait for embedding backends.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed `texts` in a single request, returning vectors in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Model name, for status reporting.
    fn model(&self) -> &str;
}

/// Build the backend selected in settings.
pub fn create_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>> {
    let embedder: Arc<dyn Embedder> = match settings.provider {
        EmbeddingProvider::OpenAI => Arc::new(OpenAIEmbedder::with_config(
            &settings.model,
            settings.dimensions as usize,
            settings.base_url.as_deref(),
        )?),
        EmbeddingProvider::Ollama => Arc::new(OllamaEmbedder::new(
            settings
                .base_url
                .as_deref()
                .unwrap_or(ollama::DEFAULT_BASE_URL),
            &settings.model,
        )?),
    };
    Ok(embedder)
}

/// Validating, retrying front end for an [`Embedder`].
pub struct EmbeddingGateway {
    embedder: Arc<dyn Embedder>,
    retry: RetryPolicy,
    batch_size: usize,
    max_concurrent: usize,
    dimensions: OnceLock<usize>,
}

impl EmbeddingGateway {
    /// Create a gateway. With `expected_dimensions` unset, the first
    /// successful response fixes the dimension for the gateway's lifetime.
    pub fn new(embedder: Arc<dyn Embedder>, expected_dimensions: Option<usize>) -> Self {
        let dimensions = OnceLock::new();
        if let Some(d) = expected_dimensions {
            let _ = dimensions.set(d);
        }
        Self {
            embedder,
            retry: RetryPolicy::default(),
            batch_size: 64,
            max_concurrent: 4,
            dimensions,
        }
    }

    /// Gateway configured from settings.
    pub fn from_settings(
        embedder: Arc<dyn Embedder>,
        settings: &EmbeddingSettings,
        retry: RetryPolicy,
    ) -> Self {
        Self::new(embedder, Some(settings.dimensions as usize))
            .with_retry(retry)
            .with_batching(settings.batch_size, settings.max_concurrent)
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set texts per request and requests in flight.
    pub fn with_batching(mut self, batch_size: usize, max_concurrent: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    /// The fixed dimension, once known.
    pub fn dimensions(&self) -> Option<usize> {
        self.dimensions.get().copied()
    }

    pub fn model(&self) -> &str {
        self.embedder.model()
    }

    /// Embed one text.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| SvarError::Embedding("Empty embedding response".to_string()))
    }

    /// Embed many texts, preserving input order.
    ///
    /// Either every text gets a vector or the whole call fails.
    #[instrument(skip(self, texts), fields(count = texts.len()))]
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let requests: Vec<_> = texts
            .chunks(self.batch_size)
            .map(|batch| self.embed_request(batch))
            .collect();
        let batches: Vec<Vec<Vec<f32>>> = stream::iter(requests)
            .buffered(self.max_concurrent)
            .try_collect()
            .await?;

        let vectors: Vec<Vec<f32>> = batches.into_iter().flatten().collect();
        debug!("Generated {} embeddings", vectors.len());
        Ok(vectors)
    }

    async fn embed_request(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        let vectors = self
            .retry
            .run("embedding", || self.embedder.embed_batch(batch))
            .await?;

        if vectors.len() != batch.len() {
            return Err(SvarError::Embedding(format!(
                "Service returned {} embeddings for {} inputs",
                vectors.len(),
                batch.len()
            )));
        }
        for vector in &vectors {
            self.validate(vector)?;
        }
        Ok(vectors)
    }

    fn validate(&self, vector: &[f32]) -> Result<()> {
        if vector.is_empty() {
            return Err(SvarError::Embedding("Service returned an empty vector".to_string()));
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(SvarError::Embedding(
                "Service returned non-numeric vector components".to_string(),
            ));
        }
        let expected = *self.dimensions.get_or_init(|| vector.len());
        if vector.len() != expected {
            return Err(SvarError::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}
