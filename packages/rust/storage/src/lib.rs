//! Turso Embedded / libSQL storage layer.
//!
//! The [`Storage`] struct wraps a libSQL database holding the topic catalog,
//! versioned content records, and the sweep/cleanup run log.
//!
//! **Concurrency rules:**
//! - One [`Storage`] is shared behind an `Arc` by the service and scheduler.
//! - Every write takes the internal write lock, so multi-statement writes never
//!   interleave on the shared connection.
//! - Claims on a `(topic, mapping)` key are single atomic upserts against the
//!   partial unique index on in-flight rows.

mod migrations;

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use freshdocs_shared::{
    CompletedContent, ContentRecord, ContentStatus, CourseId, DocMapping, FreshDocsError,
    MappingId, Result, RunLog, SweepTarget, Topic, TopicId,
};
use libsql::{Connection, Database, params, params::IntoParams};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Columns selected for every [`ContentRecord`] query, in `row_to_record` order.
const RECORD_COLUMNS: &str = "id, topic_id, mapping_id, status, official_content, ai_content, \
     content_hash, embedding_vector, similarity_score, error_message, skip_count, started_at, \
     last_scraped_at, last_updated_at";

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    write_lock: Mutex<()>,
}

impl Storage {
    /// Open or create a database at `path` and apply pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| FreshDocsError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| FreshDocsError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| FreshDocsError::Storage(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            write_lock: Mutex::new(()),
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        FreshDocsError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Catalog operations
    // -----------------------------------------------------------------------

    /// Insert a course, or return the existing one with the same title.
    pub async fn insert_course(&self, title: &str) -> Result<CourseId> {
        let _guard = self.write_lock.lock().await;
        let id = self
            .query_id(
                "INSERT INTO courses (title) VALUES (?1)
                 ON CONFLICT(title) DO UPDATE SET title = excluded.title
                 RETURNING id",
                params![title],
            )
            .await?;
        Ok(CourseId(id))
    }

    /// Insert a topic, or update description/position of the existing one
    /// with the same `(course, title)`.
    pub async fn insert_topic(
        &self,
        course_id: CourseId,
        title: &str,
        description: Option<&str>,
        position: i64,
    ) -> Result<TopicId> {
        let _guard = self.write_lock.lock().await;
        let id = self
            .query_id(
                "INSERT INTO topics (course_id, title, description, position)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(course_id, title) DO UPDATE SET
                   description = excluded.description,
                   position = excluded.position
                 RETURNING id",
                params![course_id.0, title, description, position],
            )
            .await?;
        Ok(TopicId(id))
    }

    /// Insert a documentation mapping, or update priority/active flag of the
    /// existing one with the same `(topic, url)`.
    pub async fn insert_mapping(
        &self,
        topic_id: TopicId,
        url: &str,
        priority: i64,
        is_active: bool,
    ) -> Result<MappingId> {
        let _guard = self.write_lock.lock().await;
        let id = self
            .query_id(
                "INSERT INTO doc_mappings (topic_id, url, priority, is_active)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(topic_id, url) DO UPDATE SET
                   priority = excluded.priority,
                   is_active = excluded.is_active
                 RETURNING id",
                params![topic_id.0, url, priority, i64::from(is_active)],
            )
            .await?;
        Ok(MappingId(id))
    }

    /// Get a topic joined with its course title.
    pub async fn get_topic(&self, topic_id: TopicId) -> Result<Option<Topic>> {
        let mut rows = self
            .conn
            .query(
                "SELECT t.id, t.course_id, t.title, t.description, t.position, c.title
                 FROM topics t JOIN courses c ON c.id = t.course_id
                 WHERE t.id = ?1",
                params![topic_id.0],
            )
            .await
            .map_err(|e| FreshDocsError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_topic(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(FreshDocsError::Storage(e.to_string())),
        }
    }

    /// Get the active mapping with the highest priority for a topic.
    pub async fn get_active_mapping(&self, topic_id: TopicId) -> Result<Option<DocMapping>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, topic_id, url, priority, is_active FROM doc_mappings
                 WHERE topic_id = ?1 AND is_active = 1
                 ORDER BY priority DESC, id ASC
                 LIMIT 1",
                params![topic_id.0],
            )
            .await
            .map_err(|e| FreshDocsError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_mapping(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(FreshDocsError::Storage(e.to_string())),
        }
    }

    /// Get a mapping by ID, active or not.
    pub async fn get_mapping(&self, mapping_id: MappingId) -> Result<Option<DocMapping>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, topic_id, url, priority, is_active FROM doc_mappings WHERE id = ?1",
                params![mapping_id.0],
            )
            .await
            .map_err(|e| FreshDocsError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_mapping(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(FreshDocsError::Storage(e.to_string())),
        }
    }

    /// One target per topic (its selected active mapping), least recently
    /// checked first, then by mapping priority.
    pub async fn list_sweep_targets(&self) -> Result<Vec<SweepTarget>> {
        let mut rows = self
            .conn
            .query(
                "SELECT t.id, m.id, t.title, m.url,
                        (SELECT MAX(c.last_scraped_at) FROM content_records c
                         WHERE c.topic_id = t.id AND c.mapping_id = m.id
                           AND c.status = 'completed') AS last_scraped
                 FROM topics t
                 JOIN doc_mappings m ON m.topic_id = t.id
                 WHERE m.id = (SELECT m2.id FROM doc_mappings m2
                               WHERE m2.topic_id = t.id AND m2.is_active = 1
                               ORDER BY m2.priority DESC, m2.id ASC LIMIT 1)
                 ORDER BY last_scraped IS NOT NULL, last_scraped ASC, m.priority DESC, t.id ASC",
                params![],
            )
            .await
            .map_err(|e| FreshDocsError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| FreshDocsError::Storage(e.to_string()))?
        {
            results.push(SweepTarget {
                topic_id: TopicId(
                    row.get::<i64>(0)
                        .map_err(|e| FreshDocsError::Storage(e.to_string()))?,
                ),
                mapping_id: MappingId(
                    row.get::<i64>(1)
                        .map_err(|e| FreshDocsError::Storage(e.to_string()))?,
                ),
                topic_title: row
                    .get::<String>(2)
                    .map_err(|e| FreshDocsError::Storage(e.to_string()))?,
                url: row
                    .get::<String>(3)
                    .map_err(|e| FreshDocsError::Storage(e.to_string()))?,
                last_scraped_at: row
                    .get::<String>(4)
                    .ok()
                    .map(|s| parse_ts(&s))
                    .transpose()?,
            });
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Content record reads
    // -----------------------------------------------------------------------

    /// Get any content record by row ID.
    pub async fn get_record(&self, id: &str) -> Result<Option<ContentRecord>> {
        self.query_record(
            &format!("SELECT {RECORD_COLUMNS} FROM content_records WHERE id = ?1"),
            params![id],
        )
        .await
    }

    /// Latest completed version for a `(topic, mapping)` key.
    pub async fn get_latest(
        &self,
        topic_id: TopicId,
        mapping_id: MappingId,
    ) -> Result<Option<ContentRecord>> {
        self.query_record(
            &format!(
                "SELECT {RECORD_COLUMNS} FROM content_records
                 WHERE topic_id = ?1 AND mapping_id = ?2 AND status = 'completed'
                 ORDER BY last_updated_at DESC, id DESC LIMIT 1"
            ),
            params![topic_id.0, mapping_id.0],
        )
        .await
    }

    /// Latest completed version for a topic across all of its mappings.
    pub async fn get_latest_for_topic(&self, topic_id: TopicId) -> Result<Option<ContentRecord>> {
        self.query_record(
            &format!(
                "SELECT {RECORD_COLUMNS} FROM content_records
                 WHERE topic_id = ?1 AND status = 'completed'
                 ORDER BY last_updated_at DESC, id DESC LIMIT 1"
            ),
            params![topic_id.0],
        )
        .await
    }

    /// Most recent completed version of a topic whose official content hashed to `hash`.
    pub async fn get_by_hash(&self, topic_id: TopicId, hash: &str) -> Result<Option<ContentRecord>> {
        self.query_record(
            &format!(
                "SELECT {RECORD_COLUMNS} FROM content_records
                 WHERE topic_id = ?1 AND content_hash = ?2 AND status = 'completed'
                 ORDER BY last_updated_at DESC, id DESC LIMIT 1"
            ),
            params![topic_id.0, hash],
        )
        .await
    }

    /// The in-flight attempt for a key, only if it was claimed within `lease`.
    /// Older processing rows are abandoned and ignored.
    pub async fn get_processing(
        &self,
        topic_id: TopicId,
        mapping_id: MappingId,
        lease: Duration,
    ) -> Result<Option<ContentRecord>> {
        let cutoff = lease_cutoff(Utc::now(), lease)?;
        self.query_record(
            &format!(
                "SELECT {RECORD_COLUMNS} FROM content_records
                 WHERE topic_id = ?1 AND mapping_id = ?2 AND status = 'processing'
                   AND started_at >= ?3"
            ),
            params![topic_id.0, mapping_id.0, cutoff],
        )
        .await
    }

    /// Every row for a key (any status), newest first.
    pub async fn list_versions(
        &self,
        topic_id: TopicId,
        mapping_id: MappingId,
    ) -> Result<Vec<ContentRecord>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM content_records
                     WHERE topic_id = ?1 AND mapping_id = ?2
                     ORDER BY last_updated_at DESC, id DESC"
                ),
                params![topic_id.0, mapping_id.0],
            )
            .await
            .map_err(|e| FreshDocsError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| FreshDocsError::Storage(e.to_string()))?
        {
            results.push(row_to_record(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Content record state machine
    // -----------------------------------------------------------------------

    /// Mark the key as processing. Inserts a fresh in-flight row, or refreshes
    /// the timestamp of the existing one; never creates a second in-flight row.
    pub async fn mark_processing(
        &self,
        topic_id: TopicId,
        mapping_id: MappingId,
    ) -> Result<ContentRecord> {
        let _guard = self.write_lock.lock().await;
        let now = format_ts(Utc::now());
        self.query_record(
            &format!(
                "INSERT INTO content_records
                   (id, topic_id, mapping_id, status, skip_count, started_at, last_updated_at)
                 VALUES (?1, ?2, ?3, 'processing', 0, ?4, ?4)
                 ON CONFLICT(topic_id, mapping_id) WHERE status = 'processing' DO UPDATE SET
                   started_at = excluded.started_at,
                   last_updated_at = excluded.last_updated_at
                 RETURNING {RECORD_COLUMNS}"
            ),
            params![Uuid::now_v7().to_string(), topic_id.0, mapping_id.0, now],
        )
        .await?
        .ok_or_else(|| FreshDocsError::Storage("processing upsert returned no row".into()))
    }

    /// Claim the key for a new attempt. Succeeds when no in-flight row exists or
    /// the existing one is older than `lease` (abandoned); returns `None` while a
    /// live attempt holds the key.
    pub async fn try_mark_processing(
        &self,
        topic_id: TopicId,
        mapping_id: MappingId,
        lease: Duration,
    ) -> Result<Option<ContentRecord>> {
        let _guard = self.write_lock.lock().await;
        let now = Utc::now();
        let cutoff = lease_cutoff(now, lease)?;
        let new_id = Uuid::now_v7().to_string();

        let claimed = self
            .query_record(
                &format!(
                    "INSERT INTO content_records
                       (id, topic_id, mapping_id, status, skip_count, started_at, last_updated_at)
                     VALUES (?1, ?2, ?3, 'processing', 0, ?4, ?4)
                     ON CONFLICT(topic_id, mapping_id) WHERE status = 'processing' DO UPDATE SET
                       started_at = excluded.started_at,
                       last_updated_at = excluded.last_updated_at
                     WHERE content_records.started_at < ?5
                     RETURNING {RECORD_COLUMNS}"
                ),
                params![
                    new_id.as_str(),
                    topic_id.0,
                    mapping_id.0,
                    format_ts(now),
                    cutoff
                ],
            )
            .await?;

        if let Some(record) = &claimed {
            if record.id != new_id {
                tracing::warn!(
                    topic_id = %topic_id,
                    mapping_id = %mapping_id,
                    record_id = %record.id,
                    "took over abandoned processing record"
                );
            }
        }
        Ok(claimed)
    }

    /// Complete an in-flight attempt, turning it into a new version.
    pub async fn mark_completed(
        &self,
        attempt_id: &str,
        content: &CompletedContent,
    ) -> Result<ContentRecord> {
        let _guard = self.write_lock.lock().await;
        let now = format_ts(Utc::now());
        let vector = serde_json::to_string(&content.embedding_vector)
            .map_err(|e| FreshDocsError::Storage(format!("encode embedding: {e}")))?;

        self.query_record(
            &format!(
                "UPDATE content_records SET
                   status = 'completed',
                   official_content = ?2,
                   ai_content = ?3,
                   content_hash = ?4,
                   embedding_vector = ?5,
                   similarity_score = ?6,
                   skip_count = ?7,
                   error_message = NULL,
                   last_scraped_at = ?8,
                   last_updated_at = ?8
                 WHERE id = ?1 AND status = 'processing'
                 RETURNING {RECORD_COLUMNS}"
            ),
            params![
                attempt_id,
                content.official_content.as_str(),
                content.ai_content.as_str(),
                content.content_hash.as_str(),
                vector,
                content.similarity_score,
                i64::from(content.skip_count),
                now
            ],
        )
        .await?
        .ok_or_else(|| FreshDocsError::not_found(format!("processing record {attempt_id}")))
    }

    /// Fail an in-flight attempt. Completed versions of the key are untouched.
    pub async fn mark_error(&self, attempt_id: &str, message: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let now = format_ts(Utc::now());
        self.conn
            .execute(
                "UPDATE content_records SET
                   status = 'error', error_message = ?2, last_updated_at = ?3
                 WHERE id = ?1 AND status = 'processing'",
                params![attempt_id, message, now],
            )
            .await
            .map_err(|e| FreshDocsError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Fold an exact-duplicate attempt into the existing version: bump its
    /// `last_scraped_at` and drop the attempt row.
    pub async fn touch_unchanged(
        &self,
        attempt_id: &str,
        version_id: &str,
    ) -> Result<ContentRecord> {
        {
            let _guard = self.write_lock.lock().await;
            let now = format_ts(Utc::now());
            let tx = self
                .conn
                .transaction()
                .await
                .map_err(|e| FreshDocsError::Storage(e.to_string()))?;

            let updated = tx
                .execute(
                    "UPDATE content_records SET last_scraped_at = ?2
                     WHERE id = ?1 AND status = 'completed'",
                    params![version_id, now],
                )
                .await
                .map_err(|e| FreshDocsError::Storage(e.to_string()))?;

            if updated == 0 {
                tx.rollback()
                    .await
                    .map_err(|e| FreshDocsError::Storage(e.to_string()))?;
                return Err(FreshDocsError::not_found(format!(
                    "completed record {version_id}"
                )));
            }

            tx.execute(
                "DELETE FROM content_records WHERE id = ?1 AND status = 'processing'",
                params![attempt_id],
            )
            .await
            .map_err(|e| FreshDocsError::Storage(e.to_string()))?;

            tx.commit()
                .await
                .map_err(|e| FreshDocsError::Storage(e.to_string()))?;
        }

        self.get_record(version_id)
            .await?
            .ok_or_else(|| FreshDocsError::not_found(format!("completed record {version_id}")))
    }

    /// Retain the `keep` most recent completed versions and the most recent
    /// error row per key; in-flight rows are never touched. Returns rows deleted.
    pub async fn prune_old_versions(&self, keep: u32) -> Result<u64> {
        let _guard = self.write_lock.lock().await;
        let keep = i64::from(keep.max(1));

        let completed = self
            .conn
            .execute(
                "DELETE FROM content_records WHERE id IN (
                   SELECT id FROM (
                     SELECT id, ROW_NUMBER() OVER (
                       PARTITION BY topic_id, mapping_id
                       ORDER BY last_updated_at DESC, id DESC
                     ) AS rn
                     FROM content_records WHERE status = 'completed'
                   ) WHERE rn > ?1
                 )",
                params![keep],
            )
            .await
            .map_err(|e| FreshDocsError::Storage(e.to_string()))?;

        let errors = self
            .conn
            .execute(
                "DELETE FROM content_records WHERE id IN (
                   SELECT id FROM (
                     SELECT id, ROW_NUMBER() OVER (
                       PARTITION BY topic_id, mapping_id
                       ORDER BY last_updated_at DESC, id DESC
                     ) AS rn
                     FROM content_records WHERE status = 'error'
                   ) WHERE rn > 1
                 )",
                params![],
            )
            .await
            .map_err(|e| FreshDocsError::Storage(e.to_string()))?;

        Ok(completed + errors)
    }

    // -----------------------------------------------------------------------
    // Run log
    // -----------------------------------------------------------------------

    /// Append a sweep/cleanup run entry. Returns the entry ID.
    pub async fn insert_run_log(
        &self,
        kind: &str,
        status: &str,
        details: Option<&serde_json::Value>,
        error_message: Option<&str>,
    ) -> Result<String> {
        let _guard = self.write_lock.lock().await;
        let id = Uuid::now_v7().to_string();
        let details_json = details.map(|d| d.to_string());
        self.conn
            .execute(
                "INSERT INTO update_logs (id, kind, status, details_json, error_message, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    id.as_str(),
                    kind,
                    status,
                    details_json,
                    error_message,
                    format_ts(Utc::now())
                ],
            )
            .await
            .map_err(|e| FreshDocsError::Storage(e.to_string()))?;
        Ok(id)
    }

    /// Most recent run log entries, newest first.
    pub async fn list_run_logs(&self, limit: u32) -> Result<Vec<RunLog>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, kind, status, details_json, error_message, created_at
                 FROM update_logs ORDER BY created_at DESC, id DESC LIMIT ?1",
                params![i64::from(limit)],
            )
            .await
            .map_err(|e| FreshDocsError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| FreshDocsError::Storage(e.to_string()))?
        {
            let details = match row.get::<String>(3).ok() {
                Some(json) => Some(
                    serde_json::from_str(&json)
                        .map_err(|e| FreshDocsError::Storage(format!("invalid details: {e}")))?,
                ),
                None => None,
            };
            let created_at: String = row
                .get(5)
                .map_err(|e| FreshDocsError::Storage(e.to_string()))?;
            results.push(RunLog {
                id: row
                    .get::<String>(0)
                    .map_err(|e| FreshDocsError::Storage(e.to_string()))?,
                kind: row
                    .get::<String>(1)
                    .map_err(|e| FreshDocsError::Storage(e.to_string()))?,
                status: row
                    .get::<String>(2)
                    .map_err(|e| FreshDocsError::Storage(e.to_string()))?,
                details,
                error_message: row.get::<String>(4).ok(),
                created_at: parse_ts(&created_at)?,
            });
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    async fn query_record(
        &self,
        sql: &str,
        params: impl IntoParams,
    ) -> Result<Option<ContentRecord>> {
        let mut rows = self
            .conn
            .query(sql, params)
            .await
            .map_err(|e| FreshDocsError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_record(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(FreshDocsError::Storage(e.to_string())),
        }
    }

    async fn query_id(&self, sql: &str, params: impl IntoParams) -> Result<i64> {
        let mut rows = self
            .conn
            .query(sql, params)
            .await
            .map_err(|e| FreshDocsError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => row
                .get::<i64>(0)
                .map_err(|e| FreshDocsError::Storage(e.to_string())),
            Ok(None) => Err(FreshDocsError::Storage("insert returned no id".into())),
            Err(e) => Err(FreshDocsError::Storage(e.to_string())),
        }
    }
}

/// Fixed-precision RFC 3339 so that lexical order matches chronological order.
fn format_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| FreshDocsError::Storage(format!("invalid date: {e}")))
}

fn lease_cutoff(now: DateTime<Utc>, lease: Duration) -> Result<String> {
    let lease = chrono::Duration::from_std(lease)
        .map_err(|e| FreshDocsError::Storage(format!("invalid lease: {e}")))?;
    Ok(format_ts(now - lease))
}

/// Convert a database row to a [`ContentRecord`].
fn row_to_record(row: &libsql::Row) -> Result<ContentRecord> {
    let status: String = row
        .get(3)
        .map_err(|e| FreshDocsError::Storage(e.to_string()))?;
    let embedding_vector = match row.get::<String>(7).ok() {
        Some(json) if !json.is_empty() => serde_json::from_str(&json)
            .map_err(|e| FreshDocsError::Storage(format!("invalid embedding: {e}")))?,
        _ => Vec::new(),
    };
    let started_at: String = row
        .get(11)
        .map_err(|e| FreshDocsError::Storage(e.to_string()))?;
    let last_updated_at: String = row
        .get(13)
        .map_err(|e| FreshDocsError::Storage(e.to_string()))?;

    Ok(ContentRecord {
        id: row
            .get::<String>(0)
            .map_err(|e| FreshDocsError::Storage(e.to_string()))?,
        topic_id: TopicId(
            row.get::<i64>(1)
                .map_err(|e| FreshDocsError::Storage(e.to_string()))?,
        ),
        mapping_id: MappingId(
            row.get::<i64>(2)
                .map_err(|e| FreshDocsError::Storage(e.to_string()))?,
        ),
        status: status
            .parse::<ContentStatus>()
            .map_err(FreshDocsError::Storage)?,
        official_content: row.get::<String>(4).ok(),
        ai_content: row.get::<String>(5).ok(),
        content_hash: row.get::<String>(6).ok(),
        embedding_vector,
        similarity_score: row.get::<f64>(8).ok(),
        error_message: row.get::<String>(9).ok(),
        skip_count: row.get::<i64>(10).map(|v| v.max(0) as u32).unwrap_or(0),
        started_at: parse_ts(&started_at)?,
        last_scraped_at: row
            .get::<String>(12)
            .ok()
            .map(|s| parse_ts(&s))
            .transpose()?,
        last_updated_at: parse_ts(&last_updated_at)?,
    })
}

fn row_to_topic(row: &libsql::Row) -> Result<Topic> {
    Ok(Topic {
        id: TopicId(
            row.get::<i64>(0)
                .map_err(|e| FreshDocsError::Storage(e.to_string()))?,
        ),
        course_id: CourseId(
            row.get::<i64>(1)
                .map_err(|e| FreshDocsError::Storage(e.to_string()))?,
        ),
        title: row
            .get::<String>(2)
            .map_err(|e| FreshDocsError::Storage(e.to_string()))?,
        description: row.get::<String>(3).ok(),
        position: row.get::<i64>(4).unwrap_or(0),
        course_title: row
            .get::<String>(5)
            .map_err(|e| FreshDocsError::Storage(e.to_string()))?,
    })
}

fn row_to_mapping(row: &libsql::Row) -> Result<DocMapping> {
    Ok(DocMapping {
        id: MappingId(
            row.get::<i64>(0)
                .map_err(|e| FreshDocsError::Storage(e.to_string()))?,
        ),
        topic_id: TopicId(
            row.get::<i64>(1)
                .map_err(|e| FreshDocsError::Storage(e.to_string()))?,
        ),
        url: row
            .get::<String>(2)
            .map_err(|e| FreshDocsError::Storage(e.to_string()))?,
        priority: row.get::<i64>(3).unwrap_or(0),
        is_active: row.get::<i64>(4).map(|v| v != 0).unwrap_or(false),
    })
}
