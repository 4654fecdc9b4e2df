//! Documentation fetching, main-content extraction, and text normalization.
//!
//! This crate provides:
//! - [`Fetcher`], static HTTP fetch with bounded retries and a render fallback
//! - [`extract`], readability scoring and container-selector extraction
//! - [`normalize_text`], the normalization shared by both strategies
//! - [`RenderBackend`] / [`ChromiumRenderer`], the headless-browser fallback

pub mod engine;
pub mod extract;
pub mod normalize;
pub mod render;

use async_trait::async_trait;
use freshdocs_shared::Result;

pub use engine::Fetcher;
pub use extract::extract_main_text;
pub use normalize::normalize_text;
pub use render::{ChromiumRenderer, RenderBackend};

/// Source of normalized official documentation text for a URL.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Fetch `url` and return its normalized main text.
    async fn fetch(&self, url: &str) -> Result<String>;
}
