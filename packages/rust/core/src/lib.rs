//! Content freshness and deduplication pipeline for FreshDocs.
//!
//! This crate ties the fetcher, the embedding and completion providers, and
//! storage together: [`ContentService`] decides per topic whether official
//! documentation changed enough to regenerate its explanation, and
//! [`Scheduler`] drives periodic sweeps and retention cleanup.

pub mod fingerprint;
pub mod generator;
pub mod prompt;
pub mod scheduler;
pub mod service;

#[cfg(test)]
mod testutil;

pub use fingerprint::{Fingerprinter, content_hash, cosine_similarity};
pub use generator::Generator;
pub use scheduler::{CleanupReport, Scheduler, SweepFailure, SweepReport};
pub use service::{
    ContentService, RefreshOutcome, SkipReason, TopicContent, TopicContentStatus, UpdateSummary,
};
