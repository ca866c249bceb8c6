//! Engine handle for Svar.
//!
//! Coordinates ingestion (chunk, embed, upsert) and querying (embed, retrieve,
//! cite, synthesize). Construct one [`Orchestrator`] at startup and share it;
//! it holds no per-query state.

use crate::catalog::{CatalogLoader, CourseRecord};
use crate::chunking::{chunk_source, Chunk, ChunkingConfig, TranscriptSource};
use crate::config::{Prompts, Settings};
use crate::embedding::{create_embedder, Embedder, EmbeddingGateway};
use crate::error::{Result, SvarError};
use crate::rag::{
    chunks_in_citation_order, create_language_model, map_citations, AnswerSynthesizer, Citation,
    LanguageModel, RetrievalHit, Retriever,
};
use crate::vector_store::{
    chunk_from_record, chunk_record, course_record, create_store, Collection, MetadataFilter,
    VectorStore,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Whether any transcripts are indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Uninitialized,
    Ready,
}

/// A question plus how many transcript chunks and courses to retrieve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query_text: String,
    pub n_results: usize,
    pub n_course_recs: usize,
}

impl QueryRequest {
    pub fn new(query_text: impl Into<String>, n_results: usize, n_course_recs: usize) -> Self {
        Self {
            query_text: query_text.into(),
            n_results,
            n_course_recs,
        }
    }
}

/// How a query finished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnswerStatus {
    Completed,
    /// Retrieval succeeded but synthesis did not.
    Degraded { reason: String },
}

/// The answer to one query.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerResult {
    /// `None` when synthesis failed.
    pub answer_text: Option<String>,
    pub citations: Vec<Citation>,
    pub course_recommendations: Vec<RetrievalHit<CourseRecord>>,
    #[serde(flatten)]
    pub status: AnswerStatus,
}

impl AnswerResult {
    pub fn is_degraded(&self) -> bool {
        matches!(self.status, AnswerStatus::Degraded { .. })
    }
}

/// Outcome of ingesting one transcript source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestedSource {
    pub source_id: String,
    pub chunks: usize,
    /// Chunks left over from a longer previous version and removed.
    pub stale_removed: usize,
}

/// Outcome of ingesting a directory of transcripts.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub ingested: Vec<IngestedSource>,
    /// `(file, error)` for every source that failed.
    pub failed: Vec<(PathBuf, String)>,
}

impl IngestReport {
    pub fn total_chunks(&self) -> usize {
        self.ingested.iter().map(|s| s.chunks).sum()
    }
}

/// Outcome of ingesting a course catalog.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CatalogReport {
    pub indexed: usize,
    /// Rows with neither a usable name nor a URL.
    pub skipped: usize,
    pub duplicates: usize,
    /// Courses from an earlier load of the same catalog that are gone now.
    pub stale_removed: usize,
}

/// One indexed transcript source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceSummary {
    pub source_id: String,
    pub title: Option<String>,
    pub url: Option<String>,
    pub chunk_count: usize,
}

/// Engine status for `status` and `/system-info`.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub state: EngineState,
    pub transcript_chunks: usize,
    pub courses: usize,
    pub embedding_model: String,
    pub llm_model: String,
}

/// The main engine handle.
pub struct Orchestrator {
    settings: Settings,
    chunking: ChunkingConfig,
    store: Arc<dyn VectorStore>,
    gateway: Arc<EmbeddingGateway>,
    retriever: Retriever,
    synthesizer: AnswerSynthesizer,
    catalog: CatalogLoader,
}

impl Orchestrator {
    /// Create an orchestrator with backends chosen by `settings`.
    pub fn new(settings: Settings) -> Result<Self> {
        let embedder = create_embedder(&settings.embedding)?;
        let llm = create_language_model(
            &settings.llm,
            Duration::from_secs(settings.retry.attempt_timeout_secs),
        )?;
        let store = create_store(&settings)?;
        Self::with_components(settings, embedder, llm, store)
    }

    /// Create an orchestrator with custom components.
    pub fn with_components(
        settings: Settings,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn LanguageModel>,
        store: Arc<dyn VectorStore>,
    ) -> Result<Self> {
        settings.validate()?;

        let prompts = Prompts::load(
            settings.prompts.custom_dir.as_deref(),
            Some(&settings.prompts.variables),
        )?;

        let gateway = Arc::new(EmbeddingGateway::from_settings(
            embedder,
            &settings.embedding,
            settings.retry.clone(),
        ));
        let retriever = Retriever::new(gateway.clone(), store.clone());
        let synthesizer = AnswerSynthesizer::new(llm, &settings.llm)
            .with_prompts(prompts)
            .with_retry(settings.retry.clone());

        Ok(Self {
            chunking: ChunkingConfig::try_from(&settings.chunking)?,
            catalog: CatalogLoader::new(settings.catalog.identity)?,
            settings,
            store,
            gateway,
            retriever,
            synthesizer,
        })
    }

    /// Get the settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Get a reference to the vector store.
    pub fn vector_store(&self) -> Arc<dyn VectorStore> {
        self.store.clone()
    }

    pub async fn state(&self) -> Result<EngineState> {
        Ok(match self.store.count(Collection::Transcripts).await? {
            0 => EngineState::Uninitialized,
            _ => EngineState::Ready,
        })
    }

    /// Chunk, embed and upsert one source, then drop chunks that the new
    /// version no longer produces.
    #[instrument(skip(self, source), fields(source_id = %source.id))]
    pub async fn ingest_source(&self, source: &TranscriptSource) -> Result<IngestedSource> {
        let chunks = chunk_source(source, &self.chunking);
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.gateway.embed_batch(&texts).await?;

        let records = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| chunk_record(chunk, vector))
            .collect::<Result<Vec<_>>>()?;
        self.store.upsert(Collection::Transcripts, &records).await?;

        let current: HashSet<_> = chunks.iter().map(|c| c.id).collect();
        let filter = MetadataFilter::eq("source_id", source.id.as_str());
        let stale: Vec<_> = self
            .store
            .list(Collection::Transcripts, Some(&filter))
            .await?
            .into_iter()
            .map(|r| r.id)
            .filter(|id| !current.contains(id))
            .collect();
        let stale_removed = self.store.delete(Collection::Transcripts, &stale).await?;

        info!(
            "Indexed {} chunks for {} ({} stale removed)",
            chunks.len(),
            source.id,
            stale_removed
        );
        Ok(IngestedSource {
            source_id: source.id.clone(),
            chunks: chunks.len(),
            stale_removed,
        })
    }

    /// Ingest every `*.txt` file in `dir`, one batch per file. A failing
    /// file is reported and the rest continue.
    #[instrument(skip(self))]
    pub async fn ingest_directory(&self, dir: &Path) -> Result<IngestReport> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "txt"))
            .collect();
        paths.sort();

        let mut report = IngestReport::default();
        for path in paths {
            let outcome = match TranscriptSource::from_file(&path) {
                Ok(source) => self.ingest_source(&source).await,
                Err(e) => Err(e),
            };
            match outcome {
                Ok(ingested) => report.ingested.push(ingested),
                Err(e) => {
                    warn!("Failed to ingest {:?}: {}", path, e);
                    report.failed.push((path, e.to_string()));
                }
            }
        }

        info!(
            "Ingested {} sources ({} chunks), {} failed",
            report.ingested.len(),
            report.total_chunks(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Load, embed and upsert a course catalog CSV, then drop courses that an
    /// earlier load of the same catalog indexed and this one no longer has.
    #[instrument(skip(self))]
    pub async fn ingest_catalog(&self, path: &Path) -> Result<CatalogReport> {
        let load = self.catalog.load_csv(path)?;

        let texts: Vec<String> = load.records.iter().map(|c| c.embedding_text()).collect();
        let vectors = self.gateway.embed_batch(&texts).await?;
        let records = load
            .records
            .iter()
            .zip(vectors)
            .map(|(course, vector)| course_record(course, vector))
            .collect::<Result<Vec<_>>>()?;
        let indexed = self.store.upsert(Collection::Courses, &records).await?;

        let current: HashSet<_> = load.records.iter().map(|c| c.id).collect();
        let filter = MetadataFilter::eq("catalog", load.catalog.as_str());
        let stale: Vec<_> = self
            .store
            .list(Collection::Courses, Some(&filter))
            .await?
            .into_iter()
            .map(|r| r.id)
            .filter(|id| !current.contains(id))
            .collect();
        let stale_removed = self.store.delete(Collection::Courses, &stale).await?;

        Ok(CatalogReport {
            indexed,
            skipped: load.skipped,
            duplicates: load.duplicates,
            stale_removed,
        })
    }

    fn validate_query(query_text: &str, k: usize) -> Result<()> {
        if query_text.trim().is_empty() {
            return Err(SvarError::MalformedInput("Query text is empty".to_string()));
        }
        if k == 0 {
            return Err(SvarError::MalformedInput(
                "Number of results must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    async fn ensure_ready(&self) -> Result<()> {
        match self.state().await? {
            EngineState::Ready => Ok(()),
            EngineState::Uninitialized => Err(SvarError::IndexNotReady),
        }
    }

    /// Answer a question from the indexed transcripts.
    ///
    /// A failed language-model call yields a degraded result that still
    /// carries citations and courses. Store and embedding failures are errors.
    #[instrument(skip(self, request), fields(query = %request.query_text))]
    pub async fn ask(&self, request: &QueryRequest) -> Result<AnswerResult> {
        Self::validate_query(&request.query_text, request.n_results)?;
        self.ensure_ready().await?;

        let vector = self.retriever.embed_query(&request.query_text).await?;
        let hits = self
            .retriever
            .transcripts_for_vector(&vector, request.n_results, None)
            .await?;

        let course_recommendations = if request.n_course_recs == 0
            || self.store.count(Collection::Courses).await? == 0
        {
            Vec::new()
        } else {
            self.retriever
                .courses_for_vector(&vector, request.n_course_recs)
                .await?
        };

        let citations = map_citations(&hits);
        let chunks = chunks_in_citation_order(&citations, &hits);
        let courses: Vec<CourseRecord> = course_recommendations
            .iter()
            .map(|h| h.item.clone())
            .collect();

        let (answer_text, status) = match self
            .synthesizer
            .synthesize(&request.query_text, &chunks, &courses)
            .await
        {
            Ok(text) => (Some(text), AnswerStatus::Completed),
            Err(SvarError::SynthesisFailed(reason)) => {
                warn!("Returning sources without an answer: {}", reason);
                (None, AnswerStatus::Degraded { reason })
            }
            Err(e) => return Err(e),
        };

        Ok(AnswerResult {
            answer_text,
            citations,
            course_recommendations,
            status,
        })
    }

    /// Transcript hits for a query, without synthesis.
    #[instrument(skip(self))]
    pub async fn search(&self, query_text: &str, k: usize) -> Result<Vec<RetrievalHit<Chunk>>> {
        Self::validate_query(query_text, k)?;
        self.ensure_ready().await?;
        self.retriever.retrieve_transcripts(query_text, k).await
    }

    /// Every stored chunk of a source, in sequence order.
    pub async fn passages(&self, source_id: &str) -> Result<Vec<Chunk>> {
        let filter = MetadataFilter::eq("source_id", source_id);
        let mut chunks = self
            .store
            .list(Collection::Transcripts, Some(&filter))
            .await?
            .iter()
            .map(chunk_from_record)
            .collect::<Result<Vec<_>>>()?;
        chunks.sort_by_key(|c| c.sequence_index);
        Ok(chunks)
    }

    /// One summary per indexed source, sorted by source id.
    pub async fn list_sources(&self) -> Result<Vec<SourceSummary>> {
        let mut sources: BTreeMap<String, SourceSummary> = BTreeMap::new();
        for record in self.store.list(Collection::Transcripts, None).await? {
            let chunk = chunk_from_record(&record)?;
            sources
                .entry(chunk.source_id.clone())
                .or_insert_with(|| SourceSummary {
                    source_id: chunk.source_id.clone(),
                    title: chunk.title.clone(),
                    url: chunk.url.clone(),
                    chunk_count: 0,
                })
                .chunk_count += 1;
        }
        Ok(sources.into_values().collect())
    }

    pub async fn status(&self) -> Result<EngineStatus> {
        let transcript_chunks = self.store.count(Collection::Transcripts).await?;
        Ok(EngineStatus {
            state: if transcript_chunks == 0 {
                EngineState::Uninitialized
            } else {
                EngineState::Ready
            },
            transcript_chunks,
            courses: self.store.count(Collection::Courses).await?,
            embedding_model: self.gateway.model().to_string(),
            llm_model: self.synthesizer.model().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::stitch;
    use crate::vector_store::course_from_record;
    use crate::test_util::{test_engine, StubLanguageModel};
    use tokio_test::assert_ok;

    const GRADIENT: &str = "Gradient descent is an optimisation algorithm that minimises a loss function. At each step it computes the gradient of the loss with respect to the model weights and moves the weights a small step in the opposite direction. The learning rate controls how large each step is.";

    fn gradient_source() -> TranscriptSource {
        TranscriptSource {
            id: "gd".to_string(),
            title: Some("Gradient Descent Explained".to_string()),
            url: Some("https://www.youtube.com/watch?v=gd".to_string()),
            text: GRADIENT.to_string(),
        }
    }

    #[tokio::test]
    async fn test_gradient_descent_end_to_end() {
        let llm = Arc::new(StubLanguageModel::replying(
            "Gradient descent moves weights against the gradient [1].",
        ));
        let (engine, _embedder) = test_engine(llm.clone());

        let ingested = engine.ingest_source(&gradient_source()).await.unwrap();
        assert_eq!(ingested.chunks, 3);
        assert_eq!(engine.state().await.unwrap(), EngineState::Ready);

        let hits = engine.search("what is gradient descent", 2).await.unwrap();
        assert!(hits.len() <= 2);
        assert!(hits.iter().all(|h| h.item.source_id == "gd"));

        let result = engine
            .ask(&QueryRequest::new("what is gradient descent", 2, 3))
            .await
            .unwrap();
        assert_eq!(result.status, AnswerStatus::Completed);
        assert!(!result.answer_text.as_deref().unwrap_or_default().is_empty());
        assert_eq!(result.citations.len(), 1);
        assert_eq!(result.citations[0].source_id, "gd");
        assert_eq!(result.citations[0].display_label, "Gradient Descent Explained");
        assert!(result.course_recommendations.is_empty());
        assert_eq!(llm.calls(), 1);

        let request = llm.last_request().unwrap();
        assert!(request.prompt.contains("what is gradient descent"));
        assert!(request.prompt.contains("[1] Gradient Descent Explained"));
    }

    #[tokio::test]
    async fn test_uninitialized_index_makes_no_service_calls() {
        let llm = Arc::new(StubLanguageModel::replying("unused"));
        let (engine, embedder) = test_engine(llm.clone());

        assert_eq!(engine.state().await.unwrap(), EngineState::Uninitialized);
        let err = engine
            .ask(&QueryRequest::new("what is gradient descent", 5, 3))
            .await
            .unwrap_err();

        assert!(matches!(err, SvarError::IndexNotReady));
        assert_eq!(embedder.calls(), 0);
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_malformed_queries_rejected_before_network() {
        let (engine, embedder) = test_engine(Arc::new(StubLanguageModel::replying("unused")));
        engine.ingest_source(&gradient_source()).await.unwrap();
        let calls_after_ingest = embedder.calls();

        let err = engine.ask(&QueryRequest::new("   ", 5, 3)).await.unwrap_err();
        assert!(matches!(err, SvarError::MalformedInput(_)));
        let err = engine.search("gradient", 0).await.unwrap_err();
        assert!(matches!(err, SvarError::MalformedInput(_)));
        assert_eq!(embedder.calls(), calls_after_ingest);
    }

    #[tokio::test]
    async fn test_llm_failure_degrades_with_sources() {
        let (engine, _embedder) = test_engine(Arc::new(StubLanguageModel::failing()));
        engine.ingest_source(&gradient_source()).await.unwrap();

        let result = engine
            .ask(&QueryRequest::new("what is gradient descent", 3, 3))
            .await
            .unwrap();

        assert!(result.is_degraded());
        assert!(result.answer_text.is_none());
        assert_eq!(result.citations.len(), 1);
    }

    #[tokio::test]
    async fn test_courses_recommended_when_catalog_loaded() {
        let (engine, _embedder) = test_engine(Arc::new(StubLanguageModel::replying("ok")));
        engine.ingest_source(&gradient_source()).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("catalog.csv");
        std::fs::write(
            &csv,
            "Title,URL,Level\n\
             Optimisation with Gradient Descent,https://example.com/gd,Intermediate\n\
             Baking Bread,https://example.com/bread,Beginner\n\
             ,,Orphan\n",
        )
        .unwrap();

        let report = engine.ingest_catalog(&csv).await.unwrap();
        assert_eq!(
            report,
            CatalogReport {
                indexed: 2,
                skipped: 1,
                duplicates: 0,
                stale_removed: 0,
            }
        );

        let result = engine
            .ask(&QueryRequest::new("gradient descent optimisation", 2, 1))
            .await
            .unwrap();
        assert_eq!(result.course_recommendations.len(), 1);
        assert_eq!(
            result.course_recommendations[0].item.name.as_deref(),
            Some("Optimisation with Gradient Descent")
        );

        let result = engine
            .ask(&QueryRequest::new("gradient descent", 2, 0))
            .await
            .unwrap();
        assert!(result.course_recommendations.is_empty());
    }

    #[tokio::test]
    async fn test_reloading_catalog_drops_removed_rows() {
        let (engine, _embedder) = test_engine(Arc::new(StubLanguageModel::replying("ok")));
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("spring.csv");

        std::fs::write(&csv, "course_name\nAlgebra\nBiology\nChemistry\n").unwrap();
        engine.ingest_catalog(&csv).await.unwrap();

        std::fs::write(&csv, "course_name\nBiology\nChemistry\n").unwrap();
        let report = engine.ingest_catalog(&csv).await.unwrap();
        assert_eq!(report.indexed, 2);
        assert_eq!(report.stale_removed, 1);

        let mut names: Vec<String> = engine
            .vector_store()
            .list(Collection::Courses, None)
            .await
            .unwrap()
            .iter()
            .filter_map(|r| course_from_record(r).unwrap().name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["Biology", "Chemistry"]);

        let other = dir.path().join("autumn.csv");
        std::fs::write(&other, "course_name\nDrawing\n").unwrap();
        let report = engine.ingest_catalog(&other).await.unwrap();
        assert_eq!(report.stale_removed, 0);
        assert_eq!(engine.status().await.unwrap().courses, 3);
    }

    fn assert_send<T: Send>(_: &T) {}

    #[tokio::test]
    async fn test_query_futures_are_send() {
        let (engine, _embedder) = test_engine(Arc::new(StubLanguageModel::replying("ok")));
        let request = QueryRequest::new("gradient descent", 2, 1);
        {
            let ask = engine.ask(&request);
            assert_send(&ask);
            let search = engine.search("gradient descent", 2);
            assert_send(&search);
        }

        let engine = Arc::new(engine);
        let handle = tokio::spawn({
            let engine = engine.clone();
            async move { engine.ask(&QueryRequest::new("gradient descent", 2, 0)).await }
        });
        assert!(matches!(handle.await.unwrap(), Err(SvarError::IndexNotReady)));
    }

    #[tokio::test]
    async fn test_reingest_is_idempotent_and_prunes_stale_chunks() {
        let (engine, _embedder) = test_engine(Arc::new(StubLanguageModel::replying("ok")));
        let source = gradient_source();

        let first = engine.ingest_source(&source).await.unwrap();
        let ids: Vec<_> = engine.passages("gd").await.unwrap().iter().map(|c| c.id).collect();
        let second = engine.ingest_source(&source).await.unwrap();
        let ids_again: Vec<_> = engine.passages("gd").await.unwrap().iter().map(|c| c.id).collect();

        assert_eq!(first.chunks, second.chunks);
        assert_eq!(ids, ids_again);
        assert_eq!(engine.status().await.unwrap().transcript_chunks, 3);

        let shorter = TranscriptSource {
            text: GRADIENT[..100].to_string(),
            ..source
        };
        let third = engine.ingest_source(&shorter).await.unwrap();
        assert_eq!(third.chunks, 1);
        assert_eq!(third.stale_removed, 2);
        assert_eq!(engine.status().await.unwrap().transcript_chunks, 1);
    }

    #[tokio::test]
    async fn test_passages_stitch_back_to_source() {
        let (engine, _embedder) = test_engine(Arc::new(StubLanguageModel::replying("ok")));
        engine.ingest_source(&gradient_source()).await.unwrap();

        let passages = engine.passages("gd").await.unwrap();
        assert_eq!(passages.len(), 3);
        assert_eq!(stitch(&passages), GRADIENT);
        assert!(engine.passages("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ingest_directory_reports_failures() {
        let (engine, _embedder) = test_engine(Arc::new(StubLanguageModel::replying("ok")));
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("gd.txt"),
            format!(
                "Video Title: Gradient Descent Explained\nVideo URL: https://www.youtube.com/watch?v=gd\n\n{}",
                GRADIENT
            ),
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.md"), "ignored").unwrap();
        std::fs::write(dir.path().join("broken.txt"), [0xff_u8, 0xfe, 0xfd]).unwrap();

        let report = assert_ok!(engine.ingest_directory(dir.path()).await);
        assert_eq!(report.ingested.len(), 1);
        assert_eq!(report.total_chunks(), 3);
        assert_eq!(report.failed.len(), 1);

        let sources = engine.list_sources().await.unwrap();
        assert_eq!(
            sources,
            vec![SourceSummary {
                source_id: "gd".to_string(),
                title: Some("Gradient Descent Explained".to_string()),
                url: Some("https://www.youtube.com/watch?v=gd".to_string()),
                chunk_count: 3,
            }]
        );
    }

    #[tokio::test]
    async fn test_status_reports_models_and_counts() {
        let (engine, _embedder) = test_engine(Arc::new(StubLanguageModel::replying("ok")));
        let status = engine.status().await.unwrap();
        assert_eq!(status.state, EngineState::Uninitialized);
        assert_eq!(status.transcript_chunks, 0);
        assert_eq!(status.courses, 0);
        assert_eq!(status.embedding_model, "stub-embedding");
        assert_eq!(status.llm_model, "stub-llm");
    }
}
