//! Per-topic refresh orchestration and the staleness policy.
//!
//! A refresh claims the `(topic, mapping)` key, fetches the official
//! documentation, and then decides whether the stored explanation can be kept:
//!
//! 1. an identical content hash reuses the explanation without embedding;
//! 2. an embedding at or above the similarity threshold against the topic's
//!    latest version reuses it without generation;
//! 3. anything else is regenerated.
//!
//! Failures mark only the attempt row as `error`; the last completed version
//! stays servable.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use freshdocs_fetcher::ContentSource;
use freshdocs_shared::{
    CompletedContent, ContentRecord, ContentView, DocMapping, FreshDocsError, MappingId,
    PolicyConfig, Result, Topic, TopicId,
};
use freshdocs_storage::Storage;

use crate::fingerprint::{Fingerprinter, content_hash, cosine_similarity};
use crate::generator::Generator;

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Why a refresh kept the existing explanation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The canonical content hash matched a stored version.
    ContentUnchanged,
    /// The embedding was a near-duplicate of the latest version.
    HighSimilarity,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ContentUnchanged => "content_unchanged",
            Self::HighSimilarity => "high_similarity",
        }
    }
}

/// Result of one [`ContentService::refresh`] call.
#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    /// A new explanation was generated and stored as a new version.
    Regenerated {
        similarity: Option<f64>,
        content: ContentView,
    },
    /// The existing explanation was kept.
    Unchanged {
        reason: SkipReason,
        similarity: Option<f64>,
        content: ContentView,
    },
    /// Another live attempt holds the key.
    InProgress { started_at: DateTime<Utc> },
}

impl RefreshOutcome {
    pub fn changed(&self) -> bool {
        matches!(self, Self::Regenerated { .. })
    }
}

/// Caller-facing result of [`ContentService::force_update_topic`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateSummary {
    pub changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
}

impl From<&RefreshOutcome> for UpdateSummary {
    fn from(outcome: &RefreshOutcome) -> Self {
        match outcome {
            RefreshOutcome::Regenerated { similarity, .. } => Self {
                changed: true,
                reason: None,
                similarity: *similarity,
            },
            RefreshOutcome::Unchanged {
                reason, similarity, ..
            } => Self {
                changed: false,
                reason: Some(reason.as_str().to_string()),
                similarity: *similarity,
            },
            RefreshOutcome::InProgress { .. } => Self {
                changed: false,
                reason: Some("in_progress".to_string()),
                similarity: None,
            },
        }
    }
}

/// How [`ContentService::get_topic_content`] satisfied a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicContentStatus {
    Cached,
    Generated,
    InProgress,
    NotFound,
}

/// Caller-facing result of [`ContentService::get_topic_content`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicContent {
    pub status: TopicContentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<ContentView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

impl TopicContent {
    fn with_content(status: TopicContentStatus, content: ContentView) -> Self {
        Self {
            status,
            content: Some(content),
            started_at: None,
        }
    }

    fn in_progress(started_at: DateTime<Utc>) -> Self {
        Self {
            status: TopicContentStatus::InProgress,
            content: None,
            started_at: Some(started_at),
        }
    }

    fn not_found() -> Self {
        Self {
            status: TopicContentStatus::NotFound,
            content: None,
            started_at: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Orchestrates fetch, fingerprint, store and generate for each topic.
pub struct ContentService {
    storage: Arc<Storage>,
    source: Arc<dyn ContentSource>,
    fingerprinter: Fingerprinter,
    generator: Generator,
    policy: PolicyConfig,
}

impl ContentService {
    pub fn new(
        storage: Arc<Storage>,
        source: Arc<dyn ContentSource>,
        fingerprinter: Fingerprinter,
        generator: Generator,
        policy: PolicyConfig,
    ) -> Self {
        Self {
            storage,
            source,
            fingerprinter,
            generator,
            policy,
        }
    }

    pub fn policy(&self) -> &PolicyConfig {
        &self.policy
    }

    /// Read path: serve the cached explanation for the topic's active mapping
    /// when it was checked within the cache window, report a live attempt as
    /// in progress, and otherwise run a refresh. If that refresh fails, the
    /// last completed version is served as cached.
    #[instrument(skip_all, fields(topic_id = %topic_id, force_refresh))]
    pub async fn get_topic_content(
        &self,
        topic_id: TopicId,
        force_refresh: bool,
    ) -> Result<TopicContent> {
        let Some(mapping) = self.storage.get_active_mapping(topic_id).await? else {
            debug!("topic has no active mapping");
            return Ok(TopicContent::not_found());
        };

        let latest = self.storage.get_latest(topic_id, mapping.id).await?;
        if !force_refresh {
            if let Some(latest) = latest.as_ref().filter(|l| self.is_fresh(l, Utc::now())) {
                if let Some(view) = ContentView::from_record(latest) {
                    debug!(version_id = %latest.id, "serving cached explanation");
                    return Ok(TopicContent::with_content(TopicContentStatus::Cached, view));
                }
            }
        }

        if let Some(processing) = self
            .storage
            .get_processing(topic_id, mapping.id, self.policy.processing_lease)
            .await?
        {
            return Ok(TopicContent::in_progress(processing.started_at));
        }

        let outcome = match self.refresh(topic_id, mapping.id, false).await {
            Ok(outcome) => outcome,
            Err(e) => {
                // A failed refresh leaves the last good version servable.
                let Some(view) = latest.as_ref().and_then(ContentView::from_record) else {
                    return Err(e);
                };
                warn!(error = %e, "refresh failed; serving last good explanation");
                return Ok(TopicContent::with_content(TopicContentStatus::Cached, view));
            }
        };

        Ok(match outcome {
            RefreshOutcome::InProgress { started_at } => TopicContent::in_progress(started_at),
            RefreshOutcome::Regenerated { content, .. }
            | RefreshOutcome::Unchanged { content, .. } => {
                TopicContent::with_content(TopicContentStatus::Generated, content)
            }
        })
    }

    /// Refresh the topic's active mapping now. `force` skips both
    /// short-circuits and always regenerates; it never overrides a live
    /// in-flight attempt.
    pub async fn force_update_topic(&self, topic_id: TopicId, force: bool) -> Result<UpdateSummary> {
        let mapping = self
            .storage
            .get_active_mapping(topic_id)
            .await?
            .ok_or_else(|| FreshDocsError::not_found(format!("active mapping for topic {topic_id}")))?;

        let outcome = self.refresh(topic_id, mapping.id, force).await?;
        Ok(UpdateSummary::from(&outcome))
    }

    /// Run one refresh cycle for a `(topic, mapping)` key.
    #[instrument(skip_all, fields(topic_id = %topic_id, mapping_id = %mapping_id, force))]
    pub async fn refresh(
        &self,
        topic_id: TopicId,
        mapping_id: MappingId,
        force: bool,
    ) -> Result<RefreshOutcome> {
        let topic = self
            .storage
            .get_topic(topic_id)
            .await?
            .ok_or_else(|| FreshDocsError::not_found(format!("topic {topic_id}")))?;
        let mapping = self
            .storage
            .get_mapping(mapping_id)
            .await?
            .filter(|m| m.topic_id == topic_id && m.is_active)
            .ok_or_else(|| {
                FreshDocsError::not_found(format!(
                    "active mapping {mapping_id} for topic {topic_id}"
                ))
            })?;

        let Some(attempt) = self
            .storage
            .try_mark_processing(topic_id, mapping_id, self.policy.processing_lease)
            .await?
        else {
            let started_at = self
                .storage
                .get_processing(topic_id, mapping_id, self.policy.processing_lease)
                .await?
                .map_or_else(Utc::now, |record| record.started_at);
            info!(%started_at, "refresh already in progress");
            return Ok(RefreshOutcome::InProgress { started_at });
        };

        match self.run_attempt(&attempt, &topic, &mapping, force).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                warn!(attempt_id = %attempt.id, error = %e, "refresh failed");
                if let Err(mark_err) = self.storage.mark_error(&attempt.id, &e.to_string()).await {
                    warn!(attempt_id = %attempt.id, error = %mark_err, "failed to record refresh error");
                }
                Err(e)
            }
        }
    }

    async fn run_attempt(
        &self,
        attempt: &ContentRecord,
        topic: &Topic,
        mapping: &DocMapping,
        force: bool,
    ) -> Result<RefreshOutcome> {
        let official = self.source.fetch(&mapping.url).await?;
        let hash = content_hash(&official);
        debug!(hash = %hash, chars = official.chars().count(), "official content fetched");

        let latest = self.storage.get_latest(topic.id, mapping.id).await?;

        if !force {
            if let Some(prior) = self.storage.get_by_hash(topic.id, &hash).await? {
                let is_current = latest.as_ref().is_some_and(|l| l.id == prior.id);
                let record = if is_current {
                    self.storage.touch_unchanged(&attempt.id, &prior.id).await?
                } else {
                    let reused = CompletedContent {
                        official_content: official,
                        ai_content: reused_explanation(&prior)?,
                        content_hash: hash,
                        embedding_vector: prior.embedding_vector.clone(),
                        similarity_score: None,
                        skip_count: prior.skip_count,
                    };
                    self.storage.mark_completed(&attempt.id, &reused).await?
                };
                info!(version_id = %record.id, "content unchanged; explanation reused");
                return Ok(RefreshOutcome::Unchanged {
                    reason: SkipReason::ContentUnchanged,
                    similarity: None,
                    content: view(&record)?,
                });
            }
        }

        let vector = self.fingerprinter.embed(&official).await?;
        let prior = self.storage.get_latest_for_topic(topic.id).await?;
        let similarity = prior
            .as_ref()
            .filter(|p| !p.embedding_vector.is_empty())
            .map(|p| cosine_similarity(&vector, &p.embedding_vector));

        if !force {
            if let (Some(prior), Some(sim)) = (&prior, similarity) {
                if sim >= self.policy.similarity_threshold && prior.ai_content.is_some() {
                    if self.skip_allowed(prior) {
                        // New version with the fetched text so an identical
                        // re-fetch takes the exact-duplicate path.
                        let reused = CompletedContent {
                            official_content: official,
                            ai_content: reused_explanation(prior)?,
                            content_hash: hash,
                            embedding_vector: vector,
                            similarity_score: Some(sim),
                            skip_count: prior.skip_count + 1,
                        };
                        let record = self.storage.mark_completed(&attempt.id, &reused).await?;
                        info!(
                            version_id = %record.id,
                            similarity = sim,
                            skip_count = record.skip_count,
                            "near-duplicate content; explanation reused"
                        );
                        return Ok(RefreshOutcome::Unchanged {
                            reason: SkipReason::HighSimilarity,
                            similarity: Some(sim),
                            content: view(&record)?,
                        });
                    }
                    info!(
                        similarity = sim,
                        skip_count = prior.skip_count,
                        "near-duplicate skip limit reached; regenerating"
                    );
                }
            }
        }

        // Heartbeat so a slow generation is not taken over as abandoned.
        self.storage.mark_processing(topic.id, mapping.id).await?;
        let ai_content = self
            .generator
            .generate(&official, &topic.title, &topic.course_title)
            .await?;

        let record = self
            .storage
            .mark_completed(
                &attempt.id,
                &CompletedContent {
                    official_content: official,
                    ai_content,
                    content_hash: hash,
                    embedding_vector: vector,
                    similarity_score: similarity,
                    skip_count: 0,
                },
            )
            .await?;
        info!(version_id = %record.id, similarity = ?similarity, "explanation regenerated");

        Ok(RefreshOutcome::Regenerated {
            similarity,
            content: view(&record)?,
        })
    }

    /// Whether a completed record was checked recently enough to serve as-is.
    fn is_fresh(&self, record: &ContentRecord, now: DateTime<Utc>) -> bool {
        let checked_at = record.last_scraped_at.unwrap_or(record.last_updated_at);
        match (now - checked_at).to_std() {
            Ok(age) => age < self.policy.cache_ttl,
            // Checked "in the future": clock skew between writers.
            Err(_) => true,
        }
    }

    fn skip_allowed(&self, prior: &ContentRecord) -> bool {
        self.policy
            .max_consecutive_skips
            .is_none_or(|max| prior.skip_count < max)
    }
}

fn reused_explanation(prior: &ContentRecord) -> Result<String> {
    prior.ai_content.clone().ok_or_else(|| {
        FreshDocsError::Storage(format!("completed record {} has no explanation", prior.id))
    })
}

fn view(record: &ContentRecord) -> Result<ContentView> {
    ContentView::from_record(record).ok_or_else(|| {
        FreshDocsError::Storage(format!("completed record {} is missing content", record.id))
    })
}
