//! Embedding API clients (Cohere and OpenAI-compatible).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use freshdocs_shared::{FreshDocsError, Result};

use crate::{EmbeddingProvider, bearer_client, error_body};

// ---------------------------------------------------------------------------
// Cohere
// ---------------------------------------------------------------------------

/// Client for Cohere's `/v1/embed` endpoint.
pub struct CohereEmbedder {
    client: Client,
    endpoint: String,
    model: String,
}

impl CohereEmbedder {
    pub fn new(api_key: &str, base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
        let client = bearer_client(api_key, timeout, &[]).map_err(FreshDocsError::Embedding)?;
        Ok(Self {
            client,
            endpoint: format!("{}/v1/embed", base_url.trim_end_matches('/')),
            model: model.to_string(),
        })
    }
}

#[derive(Serialize)]
struct CohereEmbedRequest<'a> {
    model: &'a str,
    texts: &'a [&'a str],
    input_type: &'a str,
}

#[derive(Deserialize)]
struct CohereEmbedResponse {
    embeddings: CohereEmbeddings,
}

/// `embeddings` is a plain list, or keyed by type when typed embeddings are returned.
#[derive(Deserialize)]
#[serde(untagged)]
enum CohereEmbeddings {
    Floats(Vec<Vec<f32>>),
    ByType { float: Vec<Vec<f32>> },
}

#[async_trait]
impl EmbeddingProvider for CohereEmbedder {
    async fn embed(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        debug!(model = %self.model, count = inputs.len(), "requesting embeddings");

        let request = CohereEmbedRequest {
            model: &self.model,
            texts: inputs,
            input_type: "search_document",
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| FreshDocsError::Embedding(format!("Cohere request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = error_body(response).await;
            return Err(FreshDocsError::Embedding(format!(
                "Cohere embed request failed ({status}): {body}"
            )));
        }

        let parsed: CohereEmbedResponse = response.json().await.map_err(|e| {
            FreshDocsError::Embedding(format!("unrecognized Cohere embed response: {e}"))
        })?;
        let vectors = match parsed.embeddings {
            CohereEmbeddings::Floats(v) | CohereEmbeddings::ByType { float: v } => v,
        };
        check_vectors(vectors, inputs.len())
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ---------------------------------------------------------------------------
// OpenAI-compatible
// ---------------------------------------------------------------------------

/// Client for OpenAI-compatible `/embeddings` endpoints.
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(api_key: &str, base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
        let client = bearer_client(api_key, timeout, &[]).map_err(FreshDocsError::Embedding)?;
        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model: model.to_string(),
        })
    }
}

#[derive(Serialize)]
struct OpenAiEmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<OpenAiEmbeddingEntry>,
}

#[derive(Deserialize)]
struct OpenAiEmbeddingEntry {
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    async fn embed(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        debug!(model = %self.model, count = inputs.len(), "requesting embeddings");

        let request = OpenAiEmbeddingRequest {
            model: &self.model,
            input: inputs,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| FreshDocsError::Embedding(format!("embeddings request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = error_body(response).await;
            return Err(FreshDocsError::Embedding(format!(
                "embeddings request failed ({status}): {body}"
            )));
        }

        let mut parsed: OpenAiEmbeddingResponse = response.json().await.map_err(|e| {
            FreshDocsError::Embedding(format!("unrecognized embeddings response: {e}"))
        })?;
        parsed.data.sort_by_key(|entry| entry.index);
        check_vectors(
            parsed.data.into_iter().map(|entry| entry.embedding).collect(),
            inputs.len(),
        )
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// One non-empty vector per input, or an error.
fn check_vectors(vectors: Vec<Vec<f32>>, expected: usize) -> Result<Vec<Vec<f32>>> {
    if vectors.len() != expected {
        return Err(FreshDocsError::Embedding(format!(
            "provider returned {} embeddings for {expected} inputs",
            vectors.len()
        )));
    }
    if vectors.iter().any(Vec::is_empty) {
        return Err(FreshDocsError::Embedding(
            "provider returned an empty embedding".into(),
        ));
    }
    Ok(vectors)
}
