//! Grounded answer synthesis.

use super::llm::{CompletionRequest, LanguageModel};
use crate::catalog::CourseRecord;
use crate::chunking::Chunk;
use crate::config::{LlmSettings, Prompts};
use crate::error::{Result, SvarError};
use crate::retry::RetryPolicy;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Builds the grounding prompt and asks the language model for an answer.
pub struct AnswerSynthesizer {
    llm: Arc<dyn LanguageModel>,
    prompts: Prompts,
    temperature: f32,
    max_tokens: u32,
    retry: RetryPolicy,
}

impl AnswerSynthesizer {
    pub fn new(llm: Arc<dyn LanguageModel>, settings: &LlmSettings) -> Self {
        Self {
            llm,
            prompts: Prompts::default(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            retry: RetryPolicy::default(),
        }
    }

    /// Set custom prompts (with user-defined variables).
    pub fn with_prompts(mut self, prompts: Prompts) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn model(&self) -> &str {
        self.llm.model()
    }

    /// Render the request sent for `question`. `chunks` must already be in
    /// citation order.
    pub fn build_request(
        &self,
        question: &str,
        chunks: &[&Chunk],
        courses: &[CourseRecord],
    ) -> CompletionRequest {
        let mut vars = HashMap::new();
        vars.insert("question".to_string(), question.to_string());
        vars.insert("context".to_string(), format_context(chunks));
        vars.insert("courses".to_string(), format_courses(courses));

        CompletionRequest {
            system: self.prompts.render_with_custom(&self.prompts.answer.system, &vars),
            prompt: self.prompts.render_with_custom(&self.prompts.answer.user, &vars),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    /// One language-model call per question. Every failure, including an
    /// empty completion, surfaces as [`SvarError::SynthesisFailed`].
    #[instrument(skip(self, chunks, courses), fields(chunks = chunks.len(), courses = courses.len()))]
    pub async fn synthesize(
        &self,
        question: &str,
        chunks: &[&Chunk],
        courses: &[CourseRecord],
    ) -> Result<String> {
        let request = self.build_request(question, chunks, courses);

        let text = self
            .retry
            .run("llm", || self.llm.complete(&request))
            .await
            .map_err(|e| {
                warn!("Language model call failed: {}", e);
                SvarError::SynthesisFailed(e.to_string())
            })?;

        let text = text.trim();
        if text.is_empty() {
            return Err(SvarError::SynthesisFailed(
                "Language model returned an empty completion".to_string(),
            ));
        }

        info!("Synthesized answer of {} chars", text.len());
        Ok(text.to_string())
    }
}

/// Numbered context blocks, one per chunk.
fn format_context(chunks: &[&Chunk]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            format!(
                "[{}] {} (part {})\n{}",
                i + 1,
                chunk.display_label(),
                chunk.sequence_index + 1,
                chunk.text.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn format_courses(courses: &[CourseRecord]) -> String {
    if courses.is_empty() {
        return String::new();
    }

    let mut text = String::from("Related courses:\n");
    for course in courses {
        match &course.url {
            Some(url) => text.push_str(&format!("- {} ({})\n", course.display_label(), url)),
            None => text.push_str(&format!("- {}\n", course.display_label())),
        }
    }
    text
}
