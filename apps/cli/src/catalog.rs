//! Topic catalog files: courses, their topics, and documentation mappings.
//!
//! ```toml
//! [[course]]
//! title = "Rust Fundamentals"
//!
//! [[course.topic]]
//! title = "Ownership"
//! description = "Moves, borrows and drops"
//!
//! [[course.topic.mapping]]
//! url = "https://doc.rust-lang.org/book/ch04-01-what-is-ownership.html"
//! priority = 10
//! ```

use std::path::Path;

use serde::Deserialize;
use url::Url;

use freshdocs_shared::{FreshDocsError, Result};
use freshdocs_storage::Storage;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct Catalog {
    #[serde(default, rename = "course")]
    pub courses: Vec<CatalogCourse>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct CatalogCourse {
    pub title: String,
    #[serde(default, rename = "topic")]
    pub topics: Vec<CatalogTopic>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct CatalogTopic {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Defaults to the topic's 1-based order in the file.
    #[serde(default)]
    pub position: Option<i64>,
    #[serde(default, rename = "mapping")]
    pub mappings: Vec<CatalogMapping>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct CatalogMapping {
    pub url: String,
    #[serde(default)]
    pub priority: i64,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Counts of catalog entries written by [`import_catalog`].
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct ImportSummary {
    pub courses: usize,
    pub topics: usize,
    pub mappings: usize,
}

pub(crate) fn load_catalog(path: &Path) -> Result<Catalog> {
    let text = std::fs::read_to_string(path).map_err(|e| FreshDocsError::io(path, e))?;
    parse_catalog(&text)
}

pub(crate) fn parse_catalog(text: &str) -> Result<Catalog> {
    let catalog: Catalog = toml::from_str(text)
        .map_err(|e| FreshDocsError::validation(format!("invalid catalog: {e}")))?;

    for course in &catalog.courses {
        if course.title.trim().is_empty() {
            return Err(FreshDocsError::validation("course title must not be empty"));
        }
        for topic in &course.topics {
            if topic.title.trim().is_empty() {
                return Err(FreshDocsError::validation(format!(
                    "topic in course '{}' has an empty title",
                    course.title
                )));
            }
            for mapping in &topic.mappings {
                let url = Url::parse(&mapping.url).map_err(|e| {
                    FreshDocsError::validation(format!(
                        "topic '{}': invalid URL '{}': {e}",
                        topic.title, mapping.url
                    ))
                })?;
                if !matches!(url.scheme(), "http" | "https") {
                    return Err(FreshDocsError::validation(format!(
                        "topic '{}': unsupported URL scheme '{}'",
                        topic.title,
                        url.scheme()
                    )));
                }
            }
        }
    }
    Ok(catalog)
}

/// Upsert every course, topic and mapping. Re-importing the same file is a no-op
/// apart from refreshing descriptions, positions, priorities and active flags.
pub(crate) async fn import_catalog(storage: &Storage, catalog: &Catalog) -> Result<ImportSummary> {
    let mut summary = ImportSummary::default();
    for course in &catalog.courses {
        let course_id = storage.insert_course(course.title.trim()).await?;
        summary.courses += 1;

        for (index, topic) in course.topics.iter().enumerate() {
            let position = topic
                .position
                .unwrap_or_else(|| i64::try_from(index + 1).unwrap_or(i64::MAX));
            let topic_id = storage
                .insert_topic(
                    course_id,
                    topic.title.trim(),
                    topic.description.as_deref(),
                    position,
                )
                .await?;
            summary.topics += 1;

            for mapping in &topic.mappings {
                storage
                    .insert_mapping(topic_id, &mapping.url, mapping.priority, mapping.active)
                    .await?;
                summary.mappings += 1;
            }
        }
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[[course]]
title = "Rust Fundamentals"

[[course.topic]]
title = "Ownership"
description = "Moves, borrows and drops"

[[course.topic.mapping]]
url = "https://doc.rust-lang.org/book/ch04-01-what-is-ownership.html"
priority = 10

[[course.topic.mapping]]
url = "https://doc.rust-lang.org/rust-by-example/scope/move.html"
active = false

[[course.topic]]
title = "Traits"
position = 7
"#;

    #[test]
    fn parses_nested_catalog() {
        let catalog = parse_catalog(SAMPLE).expect("parse");
        assert_eq!(catalog.courses.len(), 1);
        let topics = &catalog.courses[0].topics;
        assert_eq!(topics.len(), 2);
        assert_eq!(topics[0].mappings.len(), 2);
        assert!(topics[0].mappings[0].active);
        assert!(!topics[0].mappings[1].active);
        assert_eq!(topics[0].mappings[1].priority, 0);
        assert_eq!(topics[1].position, Some(7));
    }

    #[test]
    fn rejects_bad_urls_and_unknown_fields() {
        let bad_url = r#"
[[course]]
title = "C"
[[course.topic]]
title = "T"
[[course.topic.mapping]]
url = "ftp://example.com/docs"
"#;
        let err = parse_catalog(bad_url).expect_err("scheme");
        assert!(err.to_string().contains("unsupported URL scheme"));

        let typo = r#"
[[course]]
title = "C"
[[course.topic]]
titel = "T"
"#;
        assert!(parse_catalog(typo).is_err());
    }

    #[tokio::test]
    async fn import_is_idempotent() {
        let path = std::env::temp_dir().join(format!("fd_test_{}.db", uuid::Uuid::now_v7()));
        let storage = Storage::open(&path).await.expect("open");
        let catalog = parse_catalog(SAMPLE).expect("parse");

        let first = import_catalog(&storage, &catalog).await.expect("import");
        assert_eq!(
            first,
            ImportSummary {
                courses: 1,
                topics: 2,
                mappings: 2
            }
        );
        import_catalog(&storage, &catalog).await.expect("re-import");

        let targets = storage.list_sweep_targets().await.expect("targets");
        assert_eq!(targets.len(), 1);
        assert_eq!(
            targets[0].url,
            "https://doc.rust-lang.org/book/ch04-01-what-is-ownership.html"
        );
    }
}
