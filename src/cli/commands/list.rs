//! List command implementation.

use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use anyhow::Result;

/// Run the list command.
pub async fn run_list(settings: Settings) -> Result<()> {
    let orchestrator = Orchestrator::new(settings)?;

    match orchestrator.list_sources().await {
        Ok(sources) => {
            if sources.is_empty() {
                Output::info("No videos indexed yet. Use 'svar ingest <dir>' to add transcripts.");
            } else {
                Output::header(&format!("Indexed Videos ({})", sources.len()));
                println!();

                for source in &sources {
                    Output::source_info(
                        source.title.as_deref().unwrap_or(&source.source_id),
                        &source.source_id,
                        source.chunk_count,
                        source.url.as_deref(),
                    );
                }

                let total_chunks: usize = sources.iter().map(|s| s.chunk_count).sum();
                println!();
                Output::kv("Total videos", &sources.len().to_string());
                Output::kv("Total chunks", &total_chunks.to_string());
            }
        }
        Err(e) => {
            Output::error(&format!("Failed to list videos: {}", e));
            return Err(e.into());
        }
    }

    Ok(())
}
