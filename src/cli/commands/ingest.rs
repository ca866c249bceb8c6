//! Ingest command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use anyhow::Result;
use std::path::Path;

/// Run the ingest command.
pub async fn run_ingest(dir: &Path, settings: Settings) -> Result<()> {
    if !dir.is_dir() {
        anyhow::bail!("Not a directory: {}", dir.display());
    }

    if let Err(e) = preflight::check(Operation::Ingest, &settings) {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }

    let orchestrator = Orchestrator::new(settings)?;

    let spinner = Output::spinner(&format!("Indexing transcripts in {}...", dir.display()));
    let report = orchestrator.ingest_directory(dir).await;
    spinner.finish_and_clear();

    let report = match report {
        Ok(report) => report,
        Err(e) => {
            Output::error(&format!("Ingestion failed: {}", e));
            return Err(e.into());
        }
    };

    if report.ingested.is_empty() && report.failed.is_empty() {
        Output::warning("No .txt transcripts found.");
        return Ok(());
    }

    for source in &report.ingested {
        let mut line = format!("{}: {} chunks", source.source_id, source.chunks);
        if source.stale_removed > 0 {
            line.push_str(&format!(" ({} stale removed)", source.stale_removed));
        }
        Output::list_item(&line);
    }

    Output::success(&format!(
        "Indexed {} transcripts ({} chunks)",
        report.ingested.len(),
        report.total_chunks()
    ));

    if !report.failed.is_empty() {
        Output::warning(&format!("{} transcripts failed:", report.failed.len()));
        for (path, error) in &report.failed {
            Output::list_item(&format!("{}: {}", path.display(), error));
        }
    }

    Ok(())
}
