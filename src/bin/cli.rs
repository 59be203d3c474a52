//! webwatch CLI
//!
//! Local execution entry point.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use webwatch::{
    error::Result,
    models::{Config, DetectionMode, Target},
    pipeline::{self, ArchiveDispatcher, DispatcherConfig, ResultCompactor},
    services::{HttpFetcher, WaybackClient},
    storage::{LocalStore, Store},
    utils,
};

/// webwatch - Web page change watcher and archiver
#[derive(Parser, Debug)]
#[command(
    name = "webwatch",
    version,
    about = "Detects changes on web pages and archives them"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Override the storage root from the configuration
    #[arg(short, long)]
    storage: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate every target and archive the changed ones
    Check {
        /// Run even outside the configured time window
        #[arg(long)]
        force: bool,
    },

    /// Remove redundant observation history
    Compact {
        /// Only compact this target
        #[arg(long)]
        target: Option<i64>,
    },

    /// List targets with their latest observation and archive
    Targets,

    /// Register a new target
    AddTarget {
        #[arg(long)]
        url: String,

        /// `by-last-modified` or `by-content-hash`
        #[arg(long)]
        mode: DetectionMode,

        /// Element tag to extract
        #[arg(long, default_value = "body")]
        tag: String,

        #[arg(long)]
        tag_id: Option<String>,

        /// Space-separated class names
        #[arg(long)]
        tag_class: Option<String>,

        #[arg(long, default_value = "default")]
        group: String,

        #[arg(long)]
        title: Option<String>,
    },

    /// Add an entry to the User-Agent pool
    AddUserAgent { user_agent: String },

    /// Validate the configuration file
    Validate,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Store `target` under the next free id.
async fn register_target(store: &dyn Store, mut target: Target) -> Result<Target> {
    target.id = store
        .list_targets()
        .await?
        .iter()
        .map(|t| t.id)
        .max()
        .unwrap_or(0)
        + 1;
    store.insert_target(target.clone()).await?;
    log::info!(
        "Registered {} matching '{}'",
        target.label(),
        target.element_filter()
    );
    Ok(target)
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::load_or_default(&cli.config);
    let root = cli.storage.clone().unwrap_or_else(|| config.storage.root.clone());

    match cli.command {
        Command::Check { force } => {
            config.validate()?;
            let window = config.schedule.window()?;
            if config.schedule.enabled && !force && !window.contains(Utc::now()) {
                log::info!(
                    "Outside the active window ({} to {}), skipping. Use --force to run anyway.",
                    config.schedule.start,
                    config.schedule.end
                );
                return Ok(());
            }

            utils::log::header("webwatch check");
            let store = Arc::new(LocalStore::open(&root).await?);
            let fetcher = HttpFetcher::new(&config)?;
            let dispatcher = ArchiveDispatcher::spawn(
                DispatcherConfig::from_archive_config(&config.archive, &config.crawler.user_agent),
                store.clone(),
                Arc::new(WaybackClient::new(&config)?),
            );

            let report = pipeline::run_cycle(&config, store.as_ref(), &fetcher, &dispatcher).await?;

            log::info!(
                "Waiting for {} queued archive requests",
                dispatcher.pending()
            );
            let archived = dispatcher.shutdown().await;

            for changed in &report.changed {
                log::info!(
                    "  [{}] {} {}",
                    changed.group_key,
                    if changed.first_seen { "new" } else { "changed" },
                    changed.title.as_deref().unwrap_or(&changed.url)
                );
            }
            for failure in &report.failures {
                log::warn!("  #{} {}: {}", failure.target_id, failure.url, failure.error);
            }

            utils::log::summary(
                "Cycle complete",
                &[
                    ("Targets", report.processed.to_string()),
                    ("Changed", report.changed.len().to_string()),
                    ("Unchanged", report.unchanged.to_string()),
                    ("Failed", report.failures.len().to_string()),
                    ("Compacted", report.compacted.to_string()),
                    ("Archived", archived.archived.to_string()),
                    ("Retries", archived.retried.to_string()),
                    ("Gave up", archived.exhausted.to_string()),
                ],
            );
        }

        Command::Compact { target } => {
            let store = LocalStore::open(&root).await?;
            let removed = ResultCompactor::new(&store).compact(target).await?;
            log::info!("Removed {} redundant observations", removed);
        }

        Command::Targets => {
            let store = LocalStore::open(&root).await?;
            let targets = store.list_targets().await?;
            if targets.is_empty() {
                log::info!("No targets registered in {}", root.display());
            }

            for target in targets {
                let latest = store.get_latest_observation(target.id).await?;
                let archive = store.get_archive_record(target.id).await?;
                log::info!("{} [{}] ({})", target.label(), target.mode, target.group_key);
                log::info!(
                    "    last seen: {}",
                    latest
                        .map(|o| o.observed_at.to_rfc3339())
                        .unwrap_or_else(|| "never".to_string())
                );
                log::info!(
                    "    archive:   {}",
                    archive
                        .map(|a| format!("{} ({})", a.archive_url, a.created_at.to_rfc3339()))
                        .unwrap_or_else(|| "none".to_string())
                );
            }
        }

        Command::AddTarget {
            url,
            mode,
            tag,
            tag_id,
            tag_class,
            group,
            title,
        } => {
            url::Url::parse(&url)?;
            let store = LocalStore::open(&root).await?;
            let target = Target {
                id: 0,
                url,
                mode,
                tag,
                tag_id,
                tag_class,
                group_key: group,
                title,
            };
            register_target(&store, target).await?;
        }

        Command::AddUserAgent { user_agent } => {
            let store = LocalStore::open(&root).await?;
            if store.add_user_agent(&user_agent).await? {
                log::info!("Added User-Agent to the pool");
            } else {
                log::info!("User-Agent already in the pool");
            }
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!("✓ Config OK");
        }
    }

    Ok(())
}
