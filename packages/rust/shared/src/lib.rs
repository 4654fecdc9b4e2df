//! Shared types, error model, and configuration for FreshDocs.
//!
//! This crate is the foundation depended on by all other FreshDocs crates.
//! It provides:
//! - [`FreshDocsError`], the unified error type
//! - Domain types ([`Topic`], [`DocMapping`], [`ContentRecord`], [`ContentView`])
//! - Configuration ([`AppConfig`], runtime configs, config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CacheConfig, EmbeddingBackend, EmbeddingConfig, GenerationConfig, PolicyConfig,
    ScrapeConfig, ScrapingConfig, SchedulerConfig, SchedulerSection, SimilarityConfig,
    StorageConfig, config_dir, config_file_path, expand_home, init_config, load_config,
    load_config_from, read_api_key, validate_api_keys,
};
pub use error::{FreshDocsError, Result};
pub use types::{
    CompletedContent, ContentRecord, ContentStatus, ContentView, CourseId, DocMapping, MappingId,
    RunLog, SweepTarget, Topic, TopicId,
};
