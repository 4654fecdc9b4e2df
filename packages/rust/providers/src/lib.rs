//! Embedding and text-generation provider clients.
//!
//! Both provider kinds sit behind narrow traits so the content service can be
//! driven by any backend (or by scripted implementations in tests).

pub mod completion;
pub mod embedding;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};

use freshdocs_shared::{
    EmbeddingBackend, EmbeddingConfig, GenerationConfig, Result, read_api_key,
};

pub use completion::ChatCompletionsProvider;
pub use embedding::{CohereEmbedder, OpenAiEmbedder};

/// Maximum characters of an error response body kept in error messages.
const MAX_ERROR_BODY: usize = 500;

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Dense-vector embedding backend.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed each input; returns exactly one non-empty vector per input.
    async fn embed(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Model identifier, for logging.
    fn model(&self) -> &str;
}

/// Text-completion backend: take a prompt, return text.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Returns the completion text; empty output is an error, never `Ok("")`.
    async fn complete(&self, prompt: &str) -> Result<String>;
}

// ---------------------------------------------------------------------------
// Construction from config
// ---------------------------------------------------------------------------

/// Build the configured embedding provider, reading its API key from the environment.
pub fn embedder_from_config(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let api_key = read_api_key(&config.api_key_env)?;
    let timeout = Duration::from_secs(config.timeout_secs);
    let provider: Arc<dyn EmbeddingProvider> = match config.provider {
        EmbeddingBackend::Cohere => Arc::new(CohereEmbedder::new(
            &api_key,
            &config.base_url,
            &config.model,
            timeout,
        )?),
        EmbeddingBackend::OpenAi => Arc::new(OpenAiEmbedder::new(
            &api_key,
            &config.base_url,
            &config.model,
            timeout,
        )?),
    };
    Ok(provider)
}

/// Build the chat-completions provider, reading its API key from the environment.
pub fn completion_from_config(config: &GenerationConfig) -> Result<Arc<dyn CompletionProvider>> {
    let api_key = read_api_key(&config.api_key_env)?;
    Ok(Arc::new(ChatCompletionsProvider::new(&api_key, config)?))
}

// ---------------------------------------------------------------------------
// HTTP helpers
// ---------------------------------------------------------------------------

/// JSON client with bearer auth, extra default headers and a request timeout.
pub(crate) fn bearer_client(
    api_key: &str,
    timeout: Duration,
    extra_headers: &[(&str, &str)],
) -> std::result::Result<Client, String> {
    if api_key.trim().is_empty() {
        return Err("missing API key".into());
    }

    let mut headers = HeaderMap::new();
    let auth = format!("Bearer {}", api_key.trim());
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&auth).map_err(|_| "invalid API key".to_string())?,
    );
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    for (name, value) in extra_headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| format!("invalid header name '{name}': {e}"))?;
        let value =
            HeaderValue::from_str(value).map_err(|e| format!("invalid header value: {e}"))?;
        headers.insert(name, value);
    }

    Client::builder()
        .timeout(timeout)
        .default_headers(headers)
        .build()
        .map_err(|e| format!("failed to build HTTP client: {e}"))
}

/// Response body for error messages, truncated.
pub(crate) async fn error_body(response: reqwest::Response) -> String {
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<body unavailable>".to_string());
    body.chars().take(MAX_ERROR_BODY).collect()
}
