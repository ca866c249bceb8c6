//! RAG (Retrieval-Augmented Generation) for question answering with sources.
//!
//! [`Retriever`] finds transcript chunks and courses near a query,
//! [`map_citations`] folds chunk hits into per-source citations, and
//! [`AnswerSynthesizer`] asks a [`LanguageModel`] for an answer grounded in
//! the cited chunks.

mod citation;
mod llm;
mod retriever;
mod synthesizer;

pub use citation::{chunks_in_citation_order, map_citations, Citation, Span};
pub use llm::{create_language_model, CompletionRequest, LanguageModel, OpenAiChatModel};
pub use retriever::{RetrievalHit, Retriever};
pub use synthesizer::AnswerSynthesizer;
