//! Courses command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use anyhow::Result;
use std::path::Path;

/// Run the courses command.
pub async fn run_courses(csv: &Path, settings: Settings) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Ingest, &settings) {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }

    let orchestrator = Orchestrator::new(settings)?;

    let spinner = Output::spinner("Indexing course catalog...");
    let result = orchestrator.ingest_catalog(csv).await;
    spinner.finish_and_clear();

    match result {
        Ok(report) => {
            Output::success(&format!("Indexed {} courses", report.indexed));
            if report.skipped > 0 {
                Output::kv("Skipped rows (no name or URL)", &report.skipped.to_string());
            }
            if report.duplicates > 0 {
                Output::kv("Duplicate courses", &report.duplicates.to_string());
            }
            if report.stale_removed > 0 {
                Output::kv("Removed courses", &report.stale_removed.to_string());
            }
        }
        Err(e) => {
            Output::error(&format!("Failed to load catalog: {}", e));
            return Err(e.into());
        }
    }

    Ok(())
}
