//! festa-crawler CLI
//!
//! Local execution entry point for the donation ingestion pipeline.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use festa_crawler::{
    config::{load_config, load_registry},
    error::Result,
    models::{Config, DonationRecord},
    pipeline::{self, reclassify, Classifier},
    services::fetcher::PageFetcher,
    storage::{LocalStorage, RecordStorage, StoreDocument},
    utils::datetime::{normalize_timestamp, strip_embedded_timestamps},
};

/// festa - Festival Donation Leaderboard Crawler
#[derive(Parser, Debug)]
#[command(
    name = "festa",
    version,
    about = "Donation leaderboard crawler and classifier"
)]
struct Cli {
    /// Path to storage directory containing config and store files
    #[arg(short, long, default_value = "storage")]
    storage_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll the dashboard continuously until interrupted
    Poll {
        /// Override the configured dashboard URL
        #[arg(long)]
        url: Option<String>,
    },

    /// Run a single fetch → merge cycle
    Cycle {
        /// Override the configured dashboard URL
        #[arg(long)]
        url: Option<String>,
    },

    /// Merge a snapshot file into the store (offline dedup pass)
    Merge {
        /// Snapshot file: a store document or a bare record array
        input: PathBuf,

        /// Override the fuzzy dedup window for this pass
        #[arg(long)]
        window_secs: Option<u64>,
    },

    /// Re-run classification over the persisted store
    Classify,

    /// Validate configuration files
    Validate,

    /// Show current store info
    Info,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

#[cfg(feature = "browser")]
fn make_fetcher(config: &Config) -> Result<Box<dyn PageFetcher>> {
    Ok(Box::new(festa_crawler::services::BrowserFetcher::new(
        config.fetcher.clone(),
    )))
}

#[cfg(not(feature = "browser"))]
fn make_fetcher(config: &Config) -> Result<Box<dyn PageFetcher>> {
    log::warn!("Built without the browser feature, using the static fetcher");
    Ok(Box::new(festa_crawler::services::StaticFetcher::new(
        &config.fetcher,
    )?))
}

/// Read a snapshot file: either a full store document or a bare array.
fn parse_snapshot(content: &str) -> Result<Vec<DonationRecord>> {
    if let Ok(document) = serde_json::from_str::<StoreDocument>(content) {
        return Ok(document.data);
    }
    Ok(serde_json::from_str::<Vec<DonationRecord>>(content)?)
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    log::info!("festa-crawler starting...");

    let mut config = load_config(&cli.storage_dir);
    log::info!("Loaded configuration from {}", cli.storage_dir.display());

    match cli.command {
        Command::Poll { url } => {
            if let Some(url) = url {
                config.source.url = url;
            }
            config.validate()?;

            let registry = load_registry(&cli.storage_dir)?;
            log::info!("Loaded {} registered streamers", registry.len());

            let classifier = Classifier::new(&registry);
            let storage = LocalStorage::new(&cli.storage_dir, &config.source.tag);
            let mut fetcher = make_fetcher(&config)?;

            pipeline::run_poll_loop(&config, &classifier, &storage, fetcher.as_mut()).await?;
        }

        Command::Cycle { url } => {
            if let Some(url) = url {
                config.source.url = url;
            }
            config.validate()?;

            let registry = load_registry(&cli.storage_dir)?;
            let classifier = Classifier::new(&registry);
            let storage = LocalStorage::new(&cli.storage_dir, &config.source.tag);
            let mut fetcher = make_fetcher(&config)?;

            let outcome =
                pipeline::run_cycle(&config, &classifier, &storage, fetcher.as_mut()).await?;
            log::info!(
                "Cycle done: {} extracted, {} new, {} exact dup, {} fuzzy dup, {} in store",
                outcome.extracted,
                outcome.added,
                outcome.exact_collapsed,
                outcome.fuzzy_collapsed,
                outcome.store_size
            );
        }

        Command::Merge { input, window_secs } => {
            let content = std::fs::read_to_string(&input)?;
            let mut snapshot = parse_snapshot(&content)?;
            log::info!("Loaded {} records from {}", snapshot.len(), input.display());

            // Snapshots from older scrapes can carry partial timestamps and
            // missing keys; bring them up to store form first.
            let now = chrono::Local::now().naive_local();
            for record in &mut snapshot {
                record.timestamp = normalize_timestamp(&record.timestamp, now);
                record.message = strip_embedded_timestamps(&record.message);
                record.ensure_identity_key();
            }

            let storage = LocalStorage::new(&cli.storage_dir, &config.source.tag);
            let existing = storage.load_store().await?;
            let window = chrono::Duration::seconds(
                window_secs.unwrap_or(config.dedup.fuzzy_window_secs) as i64,
            );

            let outcome = pipeline::merge_records(&existing.data, &snapshot, window);
            log::info!(
                "Merge: {} new, {} exact dup, {} fuzzy dup, {} total",
                outcome.added,
                outcome.exact_collapsed,
                outcome.fuzzy_collapsed,
                outcome.records.len()
            );

            let document = StoreDocument::new(outcome.records, &config.source.tag);
            storage.write_store(&document).await?;
        }

        Command::Classify => {
            let registry = load_registry(&cli.storage_dir)?;
            if registry.is_empty() {
                log::warn!("Streamer registry is empty, nothing to classify against");
                return Ok(());
            }

            let classifier = Classifier::new(&registry);
            let storage = LocalStorage::new(&cli.storage_dir, &config.source.tag);
            let mut document = storage.load_store().await?;

            let changed = reclassify(
                &mut document.data,
                &classifier,
                &config.classify.game_amounts,
            );

            if changed > 0 {
                let document = StoreDocument::new(document.data, &config.source.tag);
                storage.write_store(&document).await?;
                log::info!("Reclassified {} records", changed);
            } else {
                log::info!("No records changed");
            }
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!("✓ Config OK");

            let registry = load_registry(&cli.storage_dir)?;
            log::info!("✓ Registry OK ({} streamers)", registry.len());

            log::info!("All validations passed!");
        }

        Command::Info => {
            log::info!("Storage directory: {}", cli.storage_dir.display());

            let store_path = cli.storage_dir.join("donations.json");
            if store_path.exists() {
                if let Ok(content) = std::fs::read_to_string(&store_path) {
                    if let Ok(document) = serde_json::from_str::<serde_json::Value>(&content) {
                        if let Some(count) =
                            document.get("data").and_then(|d| d.as_array()).map(Vec::len)
                        {
                            log::info!("Records in store: {}", count);
                        }
                        if let Some(updated) = document.get("lastUpdate") {
                            log::info!("Last updated: {}", updated);
                        }
                        if let Some(source) = document.get("source") {
                            log::info!("Source tag: {}", source);
                        }
                    }
                }
            } else {
                log::info!("No store found yet.");
            }
        }
    }

    log::info!("Done!");

    Ok(())
}
