//! Ask command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::error::SvarError;
use crate::orchestrator::{AnswerStatus, Orchestrator, QueryRequest};
use anyhow::Result;

/// Run the ask command.
pub async fn run_ask(
    question: &str,
    n_results: Option<usize>,
    n_course_recs: Option<usize>,
    settings: Settings,
) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Ask, &settings) {
        Output::error(&format!("{}", e));
        Output::info("Run 'svar config show' to check your configuration.");
        return Err(e.into());
    }

    let request = QueryRequest::new(
        question,
        n_results.unwrap_or(settings.retrieval.n_results),
        n_course_recs.unwrap_or(settings.retrieval.n_course_recs),
    );
    let orchestrator = Orchestrator::new(settings)?;

    let spinner = Output::spinner("Searching transcripts...");
    let result = orchestrator.ask(&request).await;
    spinner.finish_and_clear();

    let result = match result {
        Ok(result) => result,
        Err(SvarError::IndexNotReady) => {
            Output::warning("Nothing indexed yet. Run 'svar ingest <dir>' first.");
            return Err(SvarError::IndexNotReady.into());
        }
        Err(e) => {
            Output::error(&format!("Failed to answer: {}", e));
            return Err(e.into());
        }
    };

    match (&result.answer_text, &result.status) {
        (Some(answer), _) => println!("\n{}\n", answer),
        (None, AnswerStatus::Degraded { reason }) => {
            Output::warning(&format!("Could not generate an answer: {}", reason));
            Output::info("Showing the most relevant sources instead.");
        }
        (None, AnswerStatus::Completed) => {}
    }

    if !result.citations.is_empty() {
        Output::header("Sources");
        for (i, citation) in result.citations.iter().enumerate() {
            Output::citation(
                i + 1,
                &citation.display_label,
                citation.chunk_ids.len(),
                citation.url.as_deref(),
            );
        }
    }

    if !result.course_recommendations.is_empty() {
        Output::header("Related courses");
        for hit in &result.course_recommendations {
            let course = &hit.item;
            match &course.url {
                Some(url) => Output::list_item(&format!("{} - {}", course.display_label(), url)),
                None => Output::list_item(course.display_label()),
            }
        }
    }

    Ok(())
}
