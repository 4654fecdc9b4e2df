//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use freshdocs_core::scheduler::cleanup_versions;
use freshdocs_core::{ContentService, Fingerprinter, Generator, Scheduler, SweepReport};
use freshdocs_fetcher::Fetcher;
use freshdocs_providers::{completion_from_config, embedder_from_config};
use freshdocs_shared::{
    AppConfig, PolicyConfig, SchedulerConfig, ScrapeConfig, TopicId, expand_home, init_config,
    load_config, load_config_from, validate_api_keys,
};
use freshdocs_storage::Storage;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::catalog::{import_catalog, load_catalog};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// FreshDocs: keep generated topic explanations in sync with upstream docs.
#[derive(Parser)]
#[command(
    name = "freshdocs",
    version,
    about = "Keep generated topic explanations fresh against their upstream documentation.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.freshdocs/freshdocs.toml).
    #[arg(long, env = "FRESHDOCS_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the daily sweep and weekly cleanup until interrupted.
    Serve,

    /// Run a freshness sweep over every topic now.
    Sweep,

    /// Prune old content versions now.
    Cleanup {
        /// Versions to keep per topic mapping (defaults to scheduler.keep_versions).
        #[arg(long)]
        keep: Option<u32>,
    },

    /// Refresh one topic from its active documentation mapping.
    Refresh {
        /// Topic ID.
        #[arg(long)]
        topic: i64,

        /// Regenerate even if the content is unchanged or near-identical.
        #[arg(long)]
        force: bool,
    },

    /// Print a topic's explanation, refreshing it if the cache is stale.
    Show {
        /// Topic ID.
        #[arg(long)]
        topic: i64,

        /// Ignore the cache window and run the pipeline.
        #[arg(long)]
        refresh: bool,
    },

    /// Load courses, topics and documentation mappings from a TOML catalog.
    Import {
        /// Path to the catalog file.
        path: PathBuf,
    },

    /// Show recent sweep and cleanup runs.
    Logs {
        /// Number of entries to show.
        #[arg(long, default_value = "20")]
        limit: u32,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "freshdocs=info",
        1 => "freshdocs=debug",
        _ => "freshdocs=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    // Logs go to stderr so JSON command output on stdout stays parseable.
    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Serve => cmd_serve(config_path).await,
        Command::Sweep => cmd_sweep(config_path).await,
        Command::Cleanup { keep } => cmd_cleanup(config_path, keep).await,
        Command::Refresh { topic, force } => cmd_refresh(config_path, TopicId(topic), force).await,
        Command::Show { topic, refresh } => cmd_show(config_path, TopicId(topic), refresh).await,
        Command::Import { path } => cmd_import(config_path, &path).await,
        Command::Logs { limit } => cmd_logs(config_path, limit).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path).await,
        },
    }
}

// ---------------------------------------------------------------------------
// Composition
// ---------------------------------------------------------------------------

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    Ok(match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    })
}

async fn open_storage(config: &AppConfig) -> Result<Arc<Storage>> {
    let path = expand_home(&config.storage.database_path)?;
    info!(path = %path.display(), "opening database");
    Ok(Arc::new(Storage::open(&path).await?))
}

/// Wire the fetcher, providers and storage into a content service.
fn build_service(config: &AppConfig, storage: Arc<Storage>) -> Result<Arc<ContentService>> {
    validate_api_keys(config)?;

    let fetcher = Fetcher::new(ScrapeConfig::from(config))?;
    let embedder = embedder_from_config(&config.embedding)?;
    let completion = completion_from_config(&config.generation)?;

    Ok(Arc::new(ContentService::new(
        storage,
        Arc::new(fetcher),
        Fingerprinter::new(embedder, config.embedding.max_input_chars),
        Generator::new(completion),
        PolicyConfig::from(config),
    )))
}

fn build_scheduler(config: &AppConfig, storage: Arc<Storage>) -> Result<Scheduler> {
    let schedule = SchedulerConfig::try_from(config)?;
    let service = build_service(config, storage.clone())?;
    Ok(Scheduler::new(service, storage, schedule))
}

fn spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        spinner.set_style(
            style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
    }
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_serve(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let storage = open_storage(&config).await?;
    let scheduler = build_scheduler(&config, storage)?;

    scheduler.start().await;
    let now = Utc::now();
    println!("FreshDocs scheduler running (Ctrl-C to stop)");
    println!("  Next sweep:   {}", scheduler.next_sweep(now));
    println!("  Next cleanup: {}", scheduler.next_cleanup(now));

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| eyre!("failed to listen for Ctrl-C: {e}"))?;
    info!("shutdown requested");
    scheduler.stop().await;
    Ok(())
}

async fn cmd_sweep(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let storage = open_storage(&config).await?;
    let scheduler = build_scheduler(&config, storage)?;

    let progress = spinner("Sweeping topics...");
    let result = scheduler.trigger_sweep_now().await;
    progress.finish_and_clear();
    print_sweep_report(&result?);
    Ok(())
}

fn print_sweep_report(report: &SweepReport) {
    println!();
    println!("  Sweep complete");
    println!("  Targets:         {}", report.total);
    println!("  Regenerated:     {}", report.regenerated);
    println!("  Unchanged:       {}", report.unchanged);
    println!("  In progress:     {}", report.in_progress);
    println!("  Recently checked: {}", report.skipped_recent);
    println!("  Failed:          {}", report.failed);
    for failure in &report.failures {
        println!("    topic {}: {}", failure.topic_id, failure.error);
    }
    println!(
        "  Time:            {:.1}s",
        Duration::from_millis(report.elapsed_ms).as_secs_f64()
    );
    println!();
}

async fn cmd_cleanup(config_path: Option<&Path>, keep: Option<u32>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let storage = open_storage(&config).await?;
    let keep = keep.unwrap_or(config.scheduler.keep_versions);

    let report = cleanup_versions(&storage, keep).await?;
    println!(
        "Removed {} old version(s), keeping {} per topic mapping",
        report.deleted, report.keep
    );
    Ok(())
}

async fn cmd_refresh(config_path: Option<&Path>, topic: TopicId, force: bool) -> Result<()> {
    let config = resolve_config(config_path)?;
    let storage = open_storage(&config).await?;
    let service = build_service(&config, storage)?;

    info!(topic_id = %topic, force, "refreshing topic");
    let progress = spinner(&format!("Refreshing topic {topic}..."));
    let result = service.force_update_topic(topic, force).await;
    progress.finish_and_clear();

    println!("{}", serde_json::to_string_pretty(&result?)?);
    Ok(())
}

async fn cmd_show(config_path: Option<&Path>, topic: TopicId, refresh: bool) -> Result<()> {
    let config = resolve_config(config_path)?;
    let storage = open_storage(&config).await?;
    let service = build_service(&config, storage)?;

    let content = service.get_topic_content(topic, refresh).await?;
    println!("{}", serde_json::to_string_pretty(&content)?);
    Ok(())
}

async fn cmd_import(config_path: Option<&Path>, path: &Path) -> Result<()> {
    let config = resolve_config(config_path)?;
    let catalog = load_catalog(path)?;
    let storage = open_storage(&config).await?;

    let summary = import_catalog(&storage, &catalog).await?;
    println!(
        "Imported {} course(s), {} topic(s), {} mapping(s) from {}",
        summary.courses,
        summary.topics,
        summary.mappings,
        path.display()
    );
    Ok(())
}

async fn cmd_logs(config_path: Option<&Path>, limit: u32) -> Result<()> {
    let config = resolve_config(config_path)?;
    let storage = open_storage(&config).await?;

    let logs = storage.list_run_logs(limit).await?;
    if logs.is_empty() {
        println!("No runs recorded yet.");
        return Ok(());
    }
    for log in logs {
        let detail = match (&log.error_message, &log.details) {
            (Some(message), _) => message.clone(),
            (None, Some(details)) => details.to_string(),
            (None, None) => String::new(),
        };
        println!(
            "{}  {:<8} {:<10} {detail}",
            log.created_at.format("%Y-%m-%d %H:%M:%S"),
            log.kind,
            log.status
        );
    }
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
