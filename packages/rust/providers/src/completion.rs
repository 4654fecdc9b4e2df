//! OpenAI-compatible chat completions client (Groq, OpenRouter, OpenAI).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use freshdocs_shared::{FreshDocsError, GenerationConfig, Result};

use crate::{CompletionProvider, bearer_client, error_body};

/// Single-turn chat completions against `{base_url}/chat/completions`.
pub struct ChatCompletionsProvider {
    client: Client,
    endpoint: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl ChatCompletionsProvider {
    pub fn new(api_key: &str, config: &GenerationConfig) -> Result<Self> {
        let mut extra = Vec::new();
        if let Some(referer) = &config.referer {
            extra.push(("HTTP-Referer", referer.as_str()));
        }
        if let Some(title) = &config.title {
            extra.push(("X-Title", title.as_str()));
        }

        let client = bearer_client(api_key, Duration::from_secs(config.timeout_secs), &extra)
            .map_err(FreshDocsError::Generation)?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: u32,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl CompletionProvider for ChatCompletionsProvider {
    #[instrument(skip_all, fields(model = %self.model))]
    async fn complete(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| FreshDocsError::Generation(format!("completion request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = error_body(response).await;
            return Err(FreshDocsError::Generation(format!(
                "completion request failed ({status}): {body}"
            )));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            FreshDocsError::Generation(format!("unrecognized completion response: {e}"))
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| FreshDocsError::Generation("completion returned no choices".into()))?
            .message
            .content
            .map(|c| c.trim().to_string())
            .unwrap_or_default();

        if content.is_empty() {
            return Err(FreshDocsError::Generation(
                "completion returned empty content".into(),
            ));
        }
        debug!(chars = content.len(), "completion received");
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: &str) -> GenerationConfig {
        GenerationConfig {
            base_url: base_url.to_string(),
            model: "llama-3.1-8b-instant".into(),
            referer: Some("http://localhost:3000".into()),
            title: Some("FreshDocs".into()),
            timeout_secs: 5,
            ..GenerationConfig::default()
        }
    }

    fn reply(content: serde_json::Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-1",
            "choices": [{ "index": 0, "message": { "role": "assistant", "content": content } }]
        }))
    }

    #[tokio::test]
    async fn sends_prompt_and_returns_trimmed_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer gsk"))
            .and(header("x-title", "FreshDocs"))
            .and(header("http-referer", "http://localhost:3000"))
            .and(body_partial_json(json!({
                "model": "llama-3.1-8b-instant",
                "max_tokens": 2000,
                "messages": [{ "role": "user", "content": "Explain lifetimes" }]
            })))
            .respond_with(reply(json!("  ## Lifetimes\n\nThey scope borrows.  ")))
            .expect(1)
            .mount(&server)
            .await;

        let provider = ChatCompletionsProvider::new("gsk", &config(&server.uri())).expect("client");
        let text = provider.complete("Explain lifetimes").await.expect("complete");
        assert_eq!(text, "## Lifetimes\n\nThey scope borrows.");
    }

    #[tokio::test]
    async fn blank_or_null_content_is_an_error() {
        for content in [json!("   "), json!(null)] {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(reply(content))
                .mount(&server)
                .await;

            let provider =
                ChatCompletionsProvider::new("k", &config(&server.uri())).expect("client");
            let err = provider.complete("p").await.expect_err("empty");
            assert!(matches!(err, FreshDocsError::Generation(_)));
            assert!(err.to_string().contains("empty content"));
        }
    }

    #[tokio::test]
    async fn no_choices_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;

        let provider = ChatCompletionsProvider::new("k", &config(&server.uri())).expect("client");
        let err = provider.complete("p").await.expect_err("no choices");
        assert!(err.to_string().contains("no choices"));
    }

    #[tokio::test]
    async fn server_error_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("over capacity"))
            .mount(&server)
            .await;

        let provider = ChatCompletionsProvider::new("k", &config(&server.uri())).expect("client");
        let err = provider.complete("p").await.expect_err("503");
        assert!(err.to_string().contains("503"));
        assert!(err.to_string().contains("over capacity"));
    }

    #[tokio::test]
    async fn undecodable_body_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy error</html>"))
            .mount(&server)
            .await;

        let provider = ChatCompletionsProvider::new("k", &config(&server.uri())).expect("client");
        let err = provider.complete("p").await.expect_err("html");
        assert!(err.to_string().contains("unrecognized completion response"));
    }
}
