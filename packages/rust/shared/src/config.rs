//! Application configuration for FreshDocs.
//!
//! User config lives at `~/.freshdocs/freshdocs.toml`.
//! Every section is optional; missing keys fall back to the defaults below.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Weekday;
use serde::{Deserialize, Serialize};

use crate::error::{FreshDocsError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "freshdocs.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".freshdocs";

// ---------------------------------------------------------------------------
// Config structs (matching freshdocs.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub scraping: ScrapingConfig,

    #[serde(default)]
    pub similarity: SimilarityConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub scheduler: SchedulerSection,
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the libSQL database file (`~` is expanded).
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    "~/.freshdocs/freshdocs.db".into()
}

/// `[scraping]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapingConfig {
    #[serde(default = "default_scrape_timeout")]
    pub timeout_secs: u64,

    /// Retries after the first static attempt.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Base backoff; attempt `n` waits `n * retry_delay_ms`.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_min_content_length")]
    pub min_content_length: usize,

    /// Fall back to a headless browser once static retries are exhausted.
    #[serde(default = "default_true")]
    pub render_fallback: bool,

    #[serde(default = "default_scrape_timeout")]
    pub render_timeout_secs: u64,

    /// Explicit Chrome/Chromium binary; autodetected when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chrome_executable: Option<String>,

    /// Permit loopback/private hosts (local mirrors, tests).
    #[serde(default)]
    pub allow_private_hosts: bool,
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_scrape_timeout(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay(),
            user_agent: default_user_agent(),
            min_content_length: default_min_content_length(),
            render_fallback: true,
            render_timeout_secs: default_scrape_timeout(),
            chrome_executable: None,
            allow_private_hosts: false,
        }
    }
}

fn default_scrape_timeout() -> u64 {
    30
}
fn default_retry_attempts() -> u32 {
    3
}
fn default_retry_delay() -> u64 {
    2000
}
fn default_user_agent() -> String {
    "FreshDocs-Bot/1.0".into()
}
fn default_min_content_length() -> usize {
    100
}
fn default_true() -> bool {
    true
}

/// `[similarity]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityConfig {
    /// Cosine similarity above which regeneration is skipped.
    #[serde(default = "default_threshold")]
    pub threshold: f64,

    /// Force regeneration after this many consecutive near-duplicate skips.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_consecutive_skips: Option<u32>,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            max_consecutive_skips: None,
        }
    }
}

fn default_threshold() -> f64 {
    0.95
}

/// `[cache]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Completed content younger than this is served without a refresh.
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u64,

    /// Processing rows older than this are treated as abandoned.
    #[serde(default = "default_lease_secs")]
    pub processing_lease_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_hours: default_ttl_hours(),
            processing_lease_secs: default_lease_secs(),
        }
    }
}

fn default_ttl_hours() -> u64 {
    24
}
fn default_lease_secs() -> u64 {
    300
}

/// Which embedding API to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    Cohere,
    OpenAi,
}

/// `[embedding]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_backend")]
    pub provider: EmbeddingBackend,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default = "default_embedding_base_url")]
    pub base_url: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_embedding_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_scrape_timeout")]
    pub timeout_secs: u64,

    /// Official text is truncated to this many characters before embedding.
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_backend(),
            model: default_embedding_model(),
            base_url: default_embedding_base_url(),
            api_key_env: default_embedding_key_env(),
            timeout_secs: default_scrape_timeout(),
            max_input_chars: default_max_input_chars(),
        }
    }
}

fn default_embedding_backend() -> EmbeddingBackend {
    EmbeddingBackend::Cohere
}
fn default_embedding_model() -> String {
    "embed-english-v3.0".into()
}
fn default_embedding_base_url() -> String {
    "https://api.cohere.com".into()
}
fn default_embedding_key_env() -> String {
    "COHERE_API_KEY".into()
}
fn default_max_input_chars() -> usize {
    20_000
}

/// `[generation]` section (any OpenAI-compatible chat completions API).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_base_url")]
    pub base_url: String,

    #[serde(default = "default_generation_model")]
    pub model: String,

    #[serde(default = "default_generation_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,

    /// Optional `HTTP-Referer` attribution header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referer: Option<String>,

    /// Optional `X-Title` attribution header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: default_generation_base_url(),
            model: default_generation_model(),
            api_key_env: default_generation_key_env(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_generation_timeout(),
            referer: None,
            title: None,
        }
    }
}

fn default_generation_base_url() -> String {
    "https://api.groq.com/openai/v1".into()
}
fn default_generation_model() -> String {
    "llama-3.1-8b-instant".into()
}
fn default_generation_key_env() -> String {
    "GROQ_API_KEY".into()
}
fn default_temperature() -> f32 {
    0.4
}
fn default_max_tokens() -> u32 {
    2000
}
fn default_generation_timeout() -> u64 {
    120
}

/// `[scheduler]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSection {
    /// UTC hour of the daily freshness sweep.
    #[serde(default)]
    pub sweep_hour: u32,

    /// Day of the weekly retention cleanup (`mon`..`sun`).
    #[serde(default = "default_cleanup_weekday")]
    pub cleanup_weekday: String,

    /// UTC hour of the weekly retention cleanup.
    #[serde(default = "default_cleanup_hour")]
    pub cleanup_hour: u32,

    /// Maximum topics refreshed concurrently during a sweep.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Topics scraped more recently than this are skipped by the sweep.
    #[serde(default = "default_ttl_hours")]
    pub recheck_after_hours: u64,

    /// Completed versions retained per (topic, mapping) by cleanup.
    #[serde(default = "default_keep_versions")]
    pub keep_versions: u32,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            sweep_hour: 0,
            cleanup_weekday: default_cleanup_weekday(),
            cleanup_hour: default_cleanup_hour(),
            concurrency: default_concurrency(),
            recheck_after_hours: default_ttl_hours(),
            keep_versions: default_keep_versions(),
        }
    }
}

fn default_cleanup_weekday() -> String {
    "sun".into()
}
fn default_cleanup_hour() -> u32 {
    1
}
fn default_concurrency() -> usize {
    4
}
fn default_keep_versions() -> u32 {
    3
}

// ---------------------------------------------------------------------------
// Runtime configs (derived from AppConfig)
// ---------------------------------------------------------------------------

/// Runtime fetcher configuration.
#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    pub timeout: Duration,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
    pub user_agent: String,
    pub min_content_length: usize,
    pub render_fallback: bool,
    pub render_timeout: Duration,
    pub chrome_executable: Option<PathBuf>,
    pub allow_private_hosts: bool,
}

impl From<&AppConfig> for ScrapeConfig {
    fn from(config: &AppConfig) -> Self {
        let s = &config.scraping;
        Self {
            timeout: Duration::from_secs(s.timeout_secs),
            retry_attempts: s.retry_attempts,
            retry_delay: Duration::from_millis(s.retry_delay_ms),
            user_agent: s.user_agent.clone(),
            min_content_length: s.min_content_length,
            render_fallback: s.render_fallback,
            render_timeout: Duration::from_secs(s.render_timeout_secs),
            chrome_executable: s.chrome_executable.as_ref().map(PathBuf::from),
            allow_private_hosts: s.allow_private_hosts,
        }
    }
}

/// Runtime staleness policy used by the content service.
#[derive(Debug, Clone)]
pub struct PolicyConfig {
    pub similarity_threshold: f64,
    pub max_consecutive_skips: Option<u32>,
    pub cache_ttl: Duration,
    pub processing_lease: Duration,
    pub max_embedding_chars: usize,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for PolicyConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            similarity_threshold: config.similarity.threshold,
            max_consecutive_skips: config.similarity.max_consecutive_skips,
            cache_ttl: Duration::from_secs(config.cache.ttl_hours * 3600),
            processing_lease: Duration::from_secs(config.cache.processing_lease_secs),
            max_embedding_chars: config.embedding.max_input_chars,
        }
    }
}

/// Runtime scheduler cadence.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub sweep_hour: u32,
    pub cleanup_weekday: Weekday,
    pub cleanup_hour: u32,
    pub concurrency: usize,
    pub recheck_after: Duration,
    pub keep_versions: u32,
}

impl TryFrom<&AppConfig> for SchedulerConfig {
    type Error = FreshDocsError;

    fn try_from(config: &AppConfig) -> Result<Self> {
        let s = &config.scheduler;
        let cleanup_weekday = s.cleanup_weekday.parse::<Weekday>().map_err(|_| {
            FreshDocsError::config(format!(
                "invalid scheduler.cleanup_weekday '{}'",
                s.cleanup_weekday
            ))
        })?;
        if s.sweep_hour > 23 || s.cleanup_hour > 23 {
            return Err(FreshDocsError::config(
                "scheduler hours must be between 0 and 23",
            ));
        }
        if s.concurrency == 0 {
            return Err(FreshDocsError::config("scheduler.concurrency must be at least 1"));
        }
        Ok(Self {
            sweep_hour: s.sweep_hour,
            cleanup_weekday,
            cleanup_hour: s.cleanup_hour,
            concurrency: s.concurrency,
            recheck_after: Duration::from_secs(s.recheck_after_hours * 3600),
            keep_versions: s.keep_versions,
        })
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.freshdocs/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| FreshDocsError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.freshdocs/freshdocs.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| FreshDocsError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        FreshDocsError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| FreshDocsError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| FreshDocsError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| FreshDocsError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Expand a leading `~/` against the user's home directory.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| FreshDocsError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}

/// Read the API key named by `var_name`, failing if unset or empty.
pub fn read_api_key(var_name: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val),
        _ => Err(FreshDocsError::config(format!(
            "API key not found. Set the {var_name} environment variable."
        ))),
    }
}

/// Check that both provider API key env vars are set and non-empty.
pub fn validate_api_keys(config: &AppConfig) -> Result<()> {
    read_api_key(&config.embedding.api_key_env)?;
    read_api_key(&config.generation.api_key_env)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("database_path"));
        assert!(toml_str.contains("COHERE_API_KEY"));
        assert!(toml_str.contains("GROQ_API_KEY"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.scraping.retry_attempts, 3);
        assert_eq!(parsed.similarity.threshold, 0.95);
        assert_eq!(parsed.embedding.provider, EmbeddingBackend::Cohere);
        assert_eq!(parsed.scheduler.keep_versions, 3);
    }

    #[test]
    fn partial_config_uses_defaults() {
        let toml_str = r#"
[similarity]
threshold = 0.9
max_consecutive_skips = 5

[embedding]
provider = "openai"
model = "text-embedding-3-small"
base_url = "https://api.openai.com/v1"
api_key_env = "OPENAI_API_KEY"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.similarity.threshold, 0.9);
        assert_eq!(config.similarity.max_consecutive_skips, Some(5));
        assert_eq!(config.embedding.provider, EmbeddingBackend::OpenAi);
        assert_eq!(config.cache.ttl_hours, 24);
        assert_eq!(config.scraping.user_agent, "FreshDocs-Bot/1.0");
    }

    #[test]
    fn runtime_configs_from_app_config() {
        let app = AppConfig::default();

        let scrape = ScrapeConfig::from(&app);
        assert_eq!(scrape.timeout, Duration::from_secs(30));
        assert_eq!(scrape.retry_delay, Duration::from_millis(2000));
        assert!(scrape.render_fallback);

        let policy = PolicyConfig::from(&app);
        assert_eq!(policy.cache_ttl, Duration::from_secs(24 * 3600));
        assert_eq!(policy.processing_lease, Duration::from_secs(300));

        let sched = SchedulerConfig::try_from(&app).expect("valid scheduler config");
        assert_eq!(sched.cleanup_weekday, Weekday::Sun);
        assert_eq!(sched.cleanup_hour, 1);
        assert_eq!(sched.keep_versions, 3);
    }

    #[test]
    fn scheduler_config_rejects_bad_values() {
        let mut app = AppConfig::default();
        app.scheduler.cleanup_weekday = "someday".into();
        assert!(SchedulerConfig::try_from(&app).is_err());

        let mut app = AppConfig::default();
        app.scheduler.sweep_hour = 24;
        assert!(SchedulerConfig::try_from(&app).is_err());

        let mut app = AppConfig::default();
        app.scheduler.concurrency = 0;
        assert!(SchedulerConfig::try_from(&app).is_err());
    }

    #[test]
    fn expand_home_leaves_absolute_paths() {
        assert_eq!(
            expand_home("/var/lib/freshdocs.db").expect("expand"),
            PathBuf::from("/var/lib/freshdocs.db")
        );
    }

    #[test]
    fn api_key_validation() {
        let mut config = AppConfig::default();
        // Use unique env var names to avoid interfering with other tests
        config.embedding.api_key_env = "FD_TEST_NONEXISTENT_EMBED_KEY_12345".into();
        config.generation.api_key_env = "FD_TEST_NONEXISTENT_GEN_KEY_12345".into();
        let result = validate_api_keys(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }
}
