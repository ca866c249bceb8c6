//! Pre-flight checks before operations that call external services.
//!
//! Catches missing API keys before a long ingestion fails midway.

use crate::config::{EmbeddingProvider, Settings};
use crate::error::{Result, SvarError};

/// Requirements for different operations.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    /// Ingestion embeds transcripts or courses.
    Ingest,
    /// Search embeds the query.
    Search,
    /// Asking embeds the query and calls the language model.
    Ask,
}

/// Run pre-flight checks for the given operation.
///
/// Returns Ok(()) if all checks pass, or an error describing what's missing.
pub fn check(operation: Operation, settings: &Settings) -> Result<()> {
    if settings.embedding.provider == EmbeddingProvider::OpenAI {
        check_api_key("OPENAI_API_KEY")?;
    }
    if let Operation::Ask = operation {
        check_api_key(&settings.llm.api_key_env)?;
    }
    Ok(())
}

/// Check that an API key variable is set and non-empty.
fn check_api_key(var: &str) -> Result<()> {
    match std::env::var(var) {
        Ok(key) if !key.trim().is_empty() => Ok(()),
        Ok(_) => Err(SvarError::Config(format!(
            "{} is empty. Set it with: export {}='...'",
            var, var
        ))),
        Err(_) => Err(SvarError::Config(format!(
            "{} not set. Set it with: export {}='...'",
            var, var
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbeddingSettings;

    #[test]
    fn test_ollama_search_needs_no_key() {
        let settings = Settings {
            embedding: EmbeddingSettings::ollama(),
            ..Default::default()
        };
        assert!(check(Operation::Search, &settings).is_ok());
        assert!(check(Operation::Ingest, &settings).is_ok());
    }

    #[test]
    fn test_missing_llm_key_is_reported() {
        let mut settings = Settings {
            embedding: EmbeddingSettings::ollama(),
            ..Default::default()
        };
        settings.llm.api_key_env = "SVAR_PREFLIGHT_TEST_UNSET_KEY".to_string();

        let err = check(Operation::Ask, &settings).unwrap_err();
        assert!(err.to_string().contains("SVAR_PREFLIGHT_TEST_UNSET_KEY"));
    }
}
