//! Svar - Answers from video transcripts
//!
//! A local-first CLI tool and HTTP service that turns processed video
//! transcripts into a searchable knowledge base and answers questions with
//! citations back to the videos.
//!
//! The name "Svar" is the Norwegian/Scandinavian word for "answer."
//!
//! # Overview
//!
//! Svar allows you to:
//! - Index transcript text files as overlapping, embedded chunks
//! - Load course catalogs with inconsistent CSV headers for recommendations
//! - Ask questions and get grounded answers with per-video citations
//! - Search transcripts semantically without calling a language model
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - `config` - Configuration and prompt templates
//! - `chunking` - Transcript loading and fixed-window chunking
//! - `catalog` - Course catalog normalisation
//! - `embedding` - Embedding backends and the validating gateway
//! - `vector_store` - Vector database abstraction
//! - `rag` - Retrieval, citation mapping and answer synthesis
//! - `retry` - Timeout and backoff policy for service calls
//! - `orchestrator` - The engine handle tying it all together
//!
//! # Example
//!
//! ```rust,no_run
//! use svar::config::Settings;
//! use svar::orchestrator::{Orchestrator, QueryRequest};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let engine = Orchestrator::new(settings)?;
//!
//!     engine.ingest_directory(std::path::Path::new("transcripts")).await?;
//!
//!     let result = engine
//!         .ask(&QueryRequest::new("What is gradient descent?", 5, 3))
//!         .await?;
//!     if let Some(answer) = result.answer_text {
//!         println!("{}", answer);
//!     }
//!     for citation in result.citations {
//!         println!("- {}", citation.display_label);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod chunking;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod openai;
pub mod orchestrator;
pub mod rag;
pub mod retry;
pub mod vector_store;

#[cfg(test)]
mod test_util;

pub use error::{Result, SvarError};
