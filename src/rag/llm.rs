//! Language-model service behind a narrow completion contract.

use crate::config::LlmSettings;
use crate::error::{Result, SvarError};
use crate::openai::{classify_error, create_client_with};
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// One completion request. Only `temperature` and `max_tokens` are tunable.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Trait for language-model backends.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Return the completion text for a single request.
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;

    /// Model name, for status reporting.
    fn model(&self) -> &str;
}

/// Chat model on any OpenAI-compatible endpoint (OpenAI, Groq, ...).
pub struct OpenAiChatModel {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    model: String,
}

impl OpenAiChatModel {
    pub fn new(settings: &LlmSettings, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: create_client_with(
                settings.base_url.as_deref(),
                Some(&settings.api_key_env),
                timeout,
            )?,
            model: settings.model.clone(),
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiChatModel {
    #[instrument(skip(self, request), fields(model = %self.model))]
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(request.system.clone())
                .build()
                .map_err(|e| SvarError::rejected("llm", e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(request.prompt.clone())
                .build()
                .map_err(|e| SvarError::rejected("llm", e.to_string()))?
                .into(),
        ];

        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(request.temperature)
            .max_completion_tokens(request.max_tokens)
            .build()
            .map_err(|e| SvarError::rejected("llm", e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(chat_request)
            .await
            .map_err(|e| classify_error("llm", e))?;

        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        debug!("Received completion of {} chars", text.len());
        Ok(text)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Build the language model selected in settings.
pub fn create_language_model(settings: &LlmSettings, timeout: Duration) -> Result<Arc<dyn LanguageModel>> {
    Ok(Arc::new(OpenAiChatModel::new(settings, timeout)?))
}
