//! Deterministic stand-ins for the external services, shared by unit tests.

use crate::chunking::Chunk;
use crate::config::Settings;
use crate::embedding::{Embedder, EmbeddingGateway};
use crate::error::{Result, SvarError};
use crate::orchestrator::Orchestrator;
use crate::rag::{CompletionRequest, LanguageModel, Retriever};
use crate::retry::RetryPolicy;
use crate::vector_store::{chunk_record, Collection, MemoryVectorStore, VectorStore};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Embeds text as a hashed bag of lowercase words, so texts sharing words
/// land close together.
pub struct StubEmbedder {
    dimensions: usize,
    calls: AtomicUsize,
    failures_left: AtomicUsize,
    always_unavailable: bool,
}

impl StubEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            calls: AtomicUsize::new(0),
            failures_left: AtomicUsize::new(0),
            always_unavailable: false,
        }
    }

    /// Fail the first `n` calls with a transient error.
    pub fn failing_first(self, n: usize) -> Self {
        self.failures_left.store(n, Ordering::SeqCst);
        self
    }

    /// Fail every call with a transient error.
    pub fn unavailable(mut self) -> Self {
        self.always_unavailable = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dimensions];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let word = word.to_lowercase();
            // FNV-1a
            let hash = word.bytes().fold(0xcbf29ce484222325_u64, |h, b| {
                (h ^ b as u64).wrapping_mul(0x100000001b3)
            });
            vector[(hash % self.dimensions as u64) as usize] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl Embedder for StubEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let consumed_failure = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if self.always_unavailable || consumed_failure {
            return Err(SvarError::unavailable("embedding", "stub outage"));
        }

        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }

    fn model(&self) -> &str {
        "stub-embedding"
    }
}

/// Language model that returns a fixed reply or always fails.
pub struct StubLanguageModel {
    reply: Option<String>,
    calls: AtomicUsize,
    last_request: Mutex<Option<CompletionRequest>>,
}

impl StubLanguageModel {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Every call is rejected.
    pub fn failing() -> Self {
        Self {
            reply: None,
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.last_request.lock().ok().and_then(|r| r.clone())
    }
}

#[async_trait]
impl LanguageModel for StubLanguageModel {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_request.lock() {
            *last = Some(request.clone());
        }
        self.reply
            .clone()
            .ok_or_else(|| SvarError::rejected("llm", "stub refuses"))
    }

    fn model(&self) -> &str {
        "stub-llm"
    }
}

pub const TEST_DIMENSIONS: usize = 256;

/// Fast retry policy for tests.
pub fn quick_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 1,
        initial_backoff_ms: 1,
        max_backoff_ms: 1,
        attempt_timeout_secs: 5,
    }
}

/// Settings for an in-memory engine with small chunks.
pub fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.chunking.chunk_size = 120;
    settings.chunking.overlap = 20;
    settings.embedding.dimensions = TEST_DIMENSIONS as u32;
    settings.vector_store.provider = "memory".to_string();
    settings.retry = quick_retry();
    settings
}

/// An engine over a memory store, a stub embedder and `llm`.
pub fn test_engine(llm: Arc<dyn LanguageModel>) -> (Orchestrator, Arc<StubEmbedder>) {
    let embedder = Arc::new(StubEmbedder::new(TEST_DIMENSIONS));
    let engine = Orchestrator::with_components(
        test_settings(),
        embedder.clone(),
        llm,
        Arc::new(MemoryVectorStore::new()),
    )
    .expect("test engine");
    (engine, embedder)
}

/// A retriever over an empty memory store.
pub fn memory_retriever() -> (Retriever, Arc<dyn VectorStore>, Arc<EmbeddingGateway>) {
    let store: Arc<dyn VectorStore> = Arc::new(MemoryVectorStore::new());
    let gateway = Arc::new(
        EmbeddingGateway::new(Arc::new(StubEmbedder::new(TEST_DIMENSIONS)), Some(TEST_DIMENSIONS))
            .with_retry(quick_retry()),
    );
    (Retriever::new(gateway.clone(), store.clone()), store, gateway)
}

/// Embed and upsert chunks directly, bypassing the engine.
pub async fn index_chunks(gateway: &EmbeddingGateway, store: &dyn VectorStore, chunks: &[Chunk]) {
    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = gateway.embed_batch(&texts).await.expect("embed chunks");
    let records: Vec<_> = chunks
        .iter()
        .zip(vectors)
        .map(|(chunk, vector)| chunk_record(chunk, vector).expect("chunk record"))
        .collect();
    store
        .upsert(Collection::Transcripts, &records)
        .await
        .expect("upsert chunks");
}
