//! Status command implementation.

use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::{EngineState, Orchestrator};
use anyhow::Result;

/// Run the status command.
pub async fn run_status(settings: Settings) -> Result<()> {
    let store_path = settings.sqlite_path();
    let provider = settings.vector_store.provider.clone();
    let orchestrator = Orchestrator::new(settings)?;
    let status = orchestrator.status().await?;

    Output::header("Svar Status");
    match status.state {
        EngineState::Ready => Output::kv("Index", "ready"),
        EngineState::Uninitialized => Output::kv("Index", "empty (run 'svar ingest <dir>')"),
    }
    Output::kv("Transcript chunks", &status.transcript_chunks.to_string());
    Output::kv("Courses", &status.courses.to_string());
    Output::kv("Embedding model", &status.embedding_model);
    Output::kv("Language model", &status.llm_model);
    if provider == "sqlite" {
        Output::kv("Database", &store_path.display().to_string());
    }

    Ok(())
}
