//! Scripted collaborators for service and scheduler tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use freshdocs_fetcher::ContentSource;
use freshdocs_providers::{CompletionProvider, EmbeddingProvider};
use freshdocs_shared::{FreshDocsError, MappingId, PolicyConfig, Result, TopicId};
use freshdocs_storage::Storage;

use crate::fingerprint::Fingerprinter;
use crate::generator::Generator;
use crate::service::ContentService;

/// Serves scripted text (or failures) per URL.
#[derive(Default)]
pub struct ScriptedSource {
    pages: Mutex<HashMap<String, std::result::Result<String, String>>>,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn set(&self, url: &str, text: &str) {
        self.pages
            .lock()
            .unwrap()
            .insert(url.to_string(), Ok(text.to_string()));
    }

    pub fn fail(&self, url: &str, reason: &str) {
        self.pages
            .lock()
            .unwrap()
            .insert(url.to_string(), Err(reason.to_string()));
    }

    /// Sleep before answering, so concurrent callers overlap.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentSource for ScriptedSource {
    async fn fetch(&self, url: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.pages.lock().unwrap().get(url) {
            Some(Ok(text)) => Ok(text.clone()),
            Some(Err(reason)) => Err(FreshDocsError::fetch(reason.clone())),
            None => Err(FreshDocsError::fetch(format!("{url}: nothing scripted"))),
        }
    }
}

/// Returns the current scripted vector for every input.
pub struct ScriptedEmbedder {
    vector: Mutex<std::result::Result<Vec<f32>, String>>,
    last_input: Mutex<Option<String>>,
    calls: AtomicUsize,
}

impl ScriptedEmbedder {
    pub fn new(vector: Vec<f32>) -> Self {
        Self {
            vector: Mutex::new(Ok(vector)),
            last_input: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set(&self, vector: Vec<f32>) {
        *self.vector.lock().unwrap() = Ok(vector);
    }

    pub fn fail(&self, reason: &str) {
        *self.vector.lock().unwrap() = Err(reason.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_input(&self) -> Option<String> {
        self.last_input.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmbeddingProvider for ScriptedEmbedder {
    async fn embed(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_input.lock().unwrap() = inputs.last().map(|s| s.to_string());
        let vector = self
            .vector
            .lock()
            .unwrap()
            .clone()
            .map_err(FreshDocsError::Embedding)?;
        Ok(inputs.iter().map(|_| vector.clone()).collect())
    }

    fn model(&self) -> &str {
        "scripted-embedder"
    }
}

/// Returns the current scripted reply for every prompt.
pub struct ScriptedCompletion {
    reply: Mutex<std::result::Result<String, String>>,
    last_prompt: Mutex<Option<String>>,
    calls: AtomicUsize,
}

impl ScriptedCompletion {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: Mutex::new(Ok(reply.to_string())),
            last_prompt: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(reason: &str) -> Self {
        let provider = Self::new("");
        provider.fail(reason);
        provider
    }

    pub fn set(&self, reply: &str) {
        *self.reply.lock().unwrap() = Ok(reply.to_string());
    }

    pub fn fail(&self, reason: &str) {
        *self.reply.lock().unwrap() = Err(reason.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedCompletion {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock().unwrap() = Some(prompt.to_string());
        self.reply
            .lock()
            .unwrap()
            .clone()
            .map_err(FreshDocsError::Generation)
    }
}

pub async fn temp_storage() -> Arc<Storage> {
    let path = std::env::temp_dir().join(format!("fd_test_{}.db", uuid::Uuid::now_v7()));
    Arc::new(Storage::open(&path).await.expect("open storage"))
}

/// A service wired to scripted collaborators, with one topic and one mapping.
pub struct Harness {
    pub storage: Arc<Storage>,
    pub source: Arc<ScriptedSource>,
    pub embedder: Arc<ScriptedEmbedder>,
    pub completion: Arc<ScriptedCompletion>,
    pub service: Arc<ContentService>,
    pub topic: TopicId,
    pub mapping: MappingId,
    pub url: String,
}

pub const DOCS_URL: &str = "https://docs.example.com/ownership";

impl Harness {
    pub async fn new(policy: PolicyConfig) -> Self {
        let storage = temp_storage().await;
        let course = storage.insert_course("Rust Fundamentals").await.expect("course");
        let topic = storage
            .insert_topic(course, "Ownership", Some("Moves and borrows"), 1)
            .await
            .expect("topic");
        let mapping = storage
            .insert_mapping(topic, DOCS_URL, 0, true)
            .await
            .expect("mapping");

        let source = Arc::new(ScriptedSource::default());
        let embedder = Arc::new(ScriptedEmbedder::new(vec![1.0, 0.0, 0.0]));
        let completion = Arc::new(ScriptedCompletion::new("## Ownership\n\nEvery value has an owner."));

        let service = Arc::new(ContentService::new(
            storage.clone(),
            source.clone(),
            Fingerprinter::new(embedder.clone(), policy.max_embedding_chars),
            Generator::new(completion.clone()),
            policy,
        ));

        Self {
            storage,
            source,
            embedder,
            completion,
            service,
            topic,
            mapping,
            url: DOCS_URL.to_string(),
        }
    }

    pub async fn with_defaults() -> Self {
        Self::new(PolicyConfig::default()).await
    }
}

/// About 500 characters of documentation text.
pub fn docs_text(seed: &str) -> String {
    format!("{seed}. ").repeat(500 / (seed.len() + 2) + 1)
}
