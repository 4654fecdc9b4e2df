//! Core domain types for the topic content pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

macro_rules! id_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Ok(Self(s.trim().parse()?))
            }
        }
    };
}

id_newtype!(
    /// Identifier of a course.
    CourseId
);
id_newtype!(
    /// Identifier of a curriculum topic.
    TopicId
);
id_newtype!(
    /// Identifier of a topic → documentation URL mapping.
    MappingId
);

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// A curriculum topic joined with the title of its owning course.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    pub id: TopicId,
    pub course_id: CourseId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Ordering position within the course.
    pub position: i64,
    /// Title of the owning course (used when prompting).
    pub course_title: String,
}

/// Binding of a topic to one external documentation URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocMapping {
    pub id: MappingId,
    pub topic_id: TopicId,
    pub url: String,
    /// Higher wins when a topic has several active mappings.
    pub priority: i64,
    pub is_active: bool,
}

// ---------------------------------------------------------------------------
// ContentRecord
// ---------------------------------------------------------------------------

/// Lifecycle state of a content record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentStatus {
    Processing,
    Completed,
    Error,
}

impl ContentStatus {
    /// Column value stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

impl std::str::FromStr for ContentStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown content status '{other}'")),
        }
    }
}

/// One persisted refresh attempt / version for a `(topic, mapping)` key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentRecord {
    /// Row identifier (UUID v7).
    pub id: String,
    pub topic_id: TopicId,
    pub mapping_id: MappingId,
    pub status: ContentStatus,
    /// Normalized scraped documentation text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub official_content: Option<String>,
    /// Generated explanatory text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_content: Option<String>,
    /// SHA-256 of the canonical official content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    /// Dense embedding of the official content (empty when not computed).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding_vector: Vec<f32>,
    /// Cosine similarity against the version this one was compared with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Consecutive near-duplicate skips that reused this version.
    pub skip_count: u32,
    /// When the current attempt was claimed (lease timestamp while processing).
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_scraped_at: Option<DateTime<Utc>>,
    pub last_updated_at: DateTime<Utc>,
}

impl ContentRecord {
    /// Whether this record is `processing` and its lease is still live at `now`.
    pub fn is_live_processing(&self, lease: chrono::Duration, now: DateTime<Utc>) -> bool {
        self.status == ContentStatus::Processing && now - self.started_at < lease
    }
}

/// Payload persisted when an attempt completes with content.
#[derive(Debug, Clone)]
pub struct CompletedContent {
    pub official_content: String,
    pub ai_content: String,
    pub content_hash: String,
    pub embedding_vector: Vec<f32>,
    pub similarity_score: Option<f64>,
    /// Non-zero when the generated text was carried over from a near-duplicate.
    pub skip_count: u32,
}

/// Caller-facing view of a topic's content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentView {
    pub official_content: String,
    pub ai_content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated_at: Option<DateTime<Utc>>,
}

impl ContentView {
    /// Build a view from a completed record; `None` if either text is missing.
    pub fn from_record(record: &ContentRecord) -> Option<Self> {
        Some(Self {
            official_content: record.official_content.clone()?,
            ai_content: record.ai_content.clone()?,
            last_updated_at: Some(record.last_updated_at),
        })
    }
}

/// Work item for a freshness sweep: a topic's active mapping plus its last check.
#[derive(Debug, Clone)]
pub struct SweepTarget {
    pub topic_id: TopicId,
    pub mapping_id: MappingId,
    pub topic_title: String,
    pub url: String,
    pub last_scraped_at: Option<DateTime<Utc>>,
}

/// A row of the `update_logs` run history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLog {
    pub id: String,
    /// `sweep` or `cleanup`.
    pub kind: String,
    /// `completed` or `error`.
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}
