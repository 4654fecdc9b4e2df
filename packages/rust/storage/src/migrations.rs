//! SQL migration definitions for the FreshDocs database.
//!
//! Migrations are applied in order on database open. Each migration carries a
//! version number and the SQL batch that brings the schema to that version.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: courses, topics, doc_mappings, content_records",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Catalog
CREATE TABLE IF NOT EXISTS courses (
    id    INTEGER PRIMARY KEY,
    title TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS topics (
    id          INTEGER PRIMARY KEY,
    course_id   INTEGER NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
    title       TEXT NOT NULL,
    description TEXT,
    position    INTEGER NOT NULL DEFAULT 0,
    UNIQUE(course_id, title)
);

CREATE TABLE IF NOT EXISTS doc_mappings (
    id        INTEGER PRIMARY KEY,
    topic_id  INTEGER NOT NULL REFERENCES topics(id) ON DELETE CASCADE,
    url       TEXT NOT NULL,
    priority  INTEGER NOT NULL DEFAULT 0,
    is_active INTEGER NOT NULL DEFAULT 1,
    UNIQUE(topic_id, url)
);

CREATE INDEX IF NOT EXISTS idx_doc_mappings_topic ON doc_mappings(topic_id, is_active, priority);

-- One row per refresh attempt / retained version
CREATE TABLE IF NOT EXISTS content_records (
    id               TEXT PRIMARY KEY,
    topic_id         INTEGER NOT NULL REFERENCES topics(id) ON DELETE CASCADE,
    mapping_id       INTEGER NOT NULL REFERENCES doc_mappings(id) ON DELETE CASCADE,
    status           TEXT NOT NULL CHECK (status IN ('processing', 'completed', 'error')),
    official_content TEXT,
    ai_content       TEXT,
    content_hash     TEXT,
    embedding_vector TEXT,
    similarity_score REAL,
    error_message    TEXT,
    skip_count       INTEGER NOT NULL DEFAULT 0,
    started_at       TEXT NOT NULL,
    last_scraped_at  TEXT,
    last_updated_at  TEXT NOT NULL
);

-- At most one in-flight attempt per (topic, mapping)
CREATE UNIQUE INDEX IF NOT EXISTS idx_content_records_in_flight
    ON content_records(topic_id, mapping_id) WHERE status = 'processing';

CREATE INDEX IF NOT EXISTS idx_content_records_key
    ON content_records(topic_id, mapping_id, status, last_updated_at);
CREATE INDEX IF NOT EXISTS idx_content_records_hash
    ON content_records(topic_id, content_hash);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Run log for sweeps and cleanups",
            sql: r#"
CREATE TABLE IF NOT EXISTS update_logs (
    id            TEXT PRIMARY KEY,
    kind          TEXT NOT NULL,
    status        TEXT NOT NULL,
    details_json  TEXT,
    error_message TEXT,
    created_at    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_update_logs_created ON update_logs(created_at);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
