//! Review collector (csra-collector) - Main entry point
//!
//! Collects app store reviews for one app, scores sentiment, tags security
//! concerns and writes the dataset as CSV:
//! - `<output_dir>/raw/<name>.csv`
//! - `<output_dir>/processed/<name>_processed.csv`

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use csra_collector::{export_csv, export_processed_csv, CollectRequest, Collector, DatasetStats};
use csra_common::config::{CliOverrides, ConfigResolver};
use csra_common::{CollectionEvent, EventBus, Platform, StopReason};
use tokio::signal;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for csra-collector
#[derive(Parser, Debug)]
#[command(name = "csra-collector")]
#[command(about = "Collect app store reviews for security and privacy analysis")]
#[command(version)]
struct Args {
    /// Platform to fetch reviews from (google or apple)
    #[arg(short, long)]
    platform: String,

    /// App id (package name for Google Play, numeric id for the App Store)
    #[arg(short, long)]
    app_id: String,

    /// Country code (defaults to the configured country)
    #[arg(short, long)]
    country: Option<String>,

    /// Maximum number of reviews to fetch
    #[arg(short, long, default_value = "1000")]
    max_reviews: usize,

    /// Output file name without extension
    #[arg(short, long)]
    output: Option<String>,

    /// Delay between page requests in seconds
    #[arg(long)]
    delay: Option<f64>,

    /// Language code for Google Play
    #[arg(long)]
    lang: Option<String>,

    /// Configuration file
    #[arg(long, env = "CSRA_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = ConfigResolver::new(args.config.clone())
        .resolve()
        .context("Failed to load configuration")?;

    // Initialize tracing
    let default_filter = if args.verbose {
        "debug".to_string()
    } else {
        config.logging.level.clone()
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let platform: Platform = args
        .platform
        .parse()
        .with_context(|| format!("Invalid platform '{}'", args.platform))?;

    config
        .apply_cli_overrides(&CliOverrides {
            country: args.country.clone(),
            lang: args.lang.clone(),
            delay_secs: args.delay,
        })
        .context("Invalid command-line option")?;

    info!(
        platform = %platform,
        app_id = %args.app_id,
        country = %config.collection.default_country,
        max_reviews = args.max_reviews,
        "Starting csra-collector"
    );

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    let events = EventBus::new(100);
    tokio::spawn(log_progress(events.subscribe()));

    let collector = Collector::new(config.collection.clone())
        .context("Failed to initialize collector")?
        .with_event_bus(events)
        .with_cancellation(cancel);

    let request = CollectRequest::new(
        platform,
        args.app_id.clone(),
        config.collection.default_country.clone(),
        args.max_reviews,
    );
    let result = collector.collect(&request).await?;

    for warning in &result.warnings {
        debug!(run_id = %result.run_id, "{}", warning);
    }

    if result.stop_reason == StopReason::Aborted {
        bail!(
            "Collection aborted: {}",
            result
                .warnings
                .last()
                .map(String::as_str)
                .unwrap_or("source rejected the request")
        );
    }
    if result.records.is_empty() {
        warn!(stop_reason = %result.stop_reason, "No reviews were fetched");
        return Ok(());
    }

    let name = args.output.clone().unwrap_or_else(|| {
        format!(
            "{}_{}_{}",
            platform.slug(),
            result.app_id,
            chrono::Local::now().format("%Y%m%d_%H%M%S")
        )
    });
    let output_dir = &config.collection.output_dir;

    let raw_path = output_dir.join("raw").join(format!("{}.csv", name));
    write_file(&raw_path, &export_csv(&result.records)?).await?;
    info!(path = %raw_path.display(), "Raw data saved");

    let processed_path = output_dir
        .join("processed")
        .join(format!("{}_processed.csv", name));
    write_file(&processed_path, &export_processed_csv(&result.records)?).await?;
    info!(path = %processed_path.display(), "Processed data saved");

    log_stats(&DatasetStats::from_records(&result.records), result.dropped);

    info!(
        collected = result.collected,
        requested = result.requested,
        already_stored = result.already_stored,
        stop_reason = %result.stop_reason,
        elapsed_ms = result.duration().num_milliseconds(),
        "Collection complete"
    );
    Ok(())
}

async fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}

fn log_stats(stats: &DatasetStats, dropped: usize) {
    info!(
        total = stats.total,
        positive = stats.positive,
        neutral = stats.neutral,
        negative = stats.negative,
        dropped,
        "Fetch statistics"
    );
    info!(
        security_related = stats.security_related,
        security_pct = %format!("{:.1}", stats.security_percentage()),
        "Security relevance"
    );
    for (tag, count) in &stats.tag_counts {
        info!(tag = %tag, count, "Security tag");
    }
    if let Some(average) = stats.average_rating {
        info!(average_rating = %format!("{:.2}", average), "Ratings");
    }
}

/// Cancel the run on Ctrl+C; the partial result is still written
async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received Ctrl+C, stopping after the current page");
            cancel.cancel();
        }
        Err(e) => warn!(error = %e, "Failed to install Ctrl+C handler"),
    }
}

async fn log_progress(mut rx: broadcast::Receiver<CollectionEvent>) {
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(skipped, "Progress logger lagged");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        match event {
            CollectionEvent::PageProcessed {
                page_index, total, ..
            } => info!(page = page_index, total, "Page collected"),
            CollectionEvent::RetryScheduled {
                page_index,
                attempt,
                delay_ms,
                ..
            } => info!(page = page_index, attempt, backoff_ms = delay_ms, "Retrying page"),
            _ => {}
        }
    }
}
