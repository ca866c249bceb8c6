//! OpenAI-compatible client configuration and error classification.

use crate::error::{Result, SvarError};
use async_openai::error::OpenAIError;
use async_openai::{config::OpenAIConfig, Client};
use std::time::Duration;

/// Default timeout for API requests.
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Create a client for any OpenAI-compatible endpoint.
///
/// `api_key_env` names the environment variable holding the key; when it is
/// unset the library default (`OPENAI_API_KEY`) applies.
pub fn create_client_with(
    base_url: Option<&str>,
    api_key_env: Option<&str>,
    timeout: Duration,
) -> Result<Client<OpenAIConfig>> {
    let http_client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| SvarError::Config(format!("Failed to create HTTP client: {}", e)))?;

    let mut config = OpenAIConfig::default();
    if let Some(base) = base_url {
        config = config.with_api_base(base.trim_end_matches('/'));
    }
    if let Some(key) = api_key_env.and_then(|var| std::env::var(var).ok()) {
        config = config.with_api_key(key);
    }

    Ok(Client::with_config(config).with_http_client(http_client))
}

/// API error types and codes worth retrying.
const TRANSIENT_API_ERRORS: &[&str] = &[
    "server_error",
    "overloaded_error",
    "rate_limit_exceeded",
    "rate_limit_error",
];

/// Map an API error onto the retry taxonomy.
pub(crate) fn classify_error(service: &str, err: OpenAIError) -> SvarError {
    match err {
        OpenAIError::Reqwest(e) => {
            if e.is_timeout() || e.is_connect() || e.is_request() {
                SvarError::unavailable(service, e.to_string())
            } else if e.status().is_some_and(|s| s.is_server_error() || s.as_u16() == 429) {
                SvarError::unavailable(service, e.to_string())
            } else {
                SvarError::rejected(service, e.to_string())
            }
        }
        OpenAIError::ApiError(api) => {
            let transient = [api.r#type.as_deref(), api.code.as_deref()]
                .into_iter()
                .flatten()
                .any(|kind| TRANSIENT_API_ERRORS.contains(&kind));
            if transient {
                SvarError::unavailable(service, api.message)
            } else {
                SvarError::rejected(service, api.message)
            }
        }
        OpenAIError::JSONDeserialize(e) if service == "embedding" => {
            SvarError::Embedding(format!("Malformed embedding response: {}", e))
        }
        OpenAIError::JSONDeserialize(e) => {
            SvarError::rejected(service, format!("unreadable response: {}", e))
        }
        other => SvarError::rejected(service, other.to_string()),
    }
}
