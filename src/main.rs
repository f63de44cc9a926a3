//! # Broadcast Scrape
//!
//! Scrapes the program schedules of radio stations and emits one JSON record
//! per broadcast.
//!
//! ## Usage
//!
//! ```sh
//! broadcast_scrape b2 b4 -j ./archive
//! ```
//!
//! ## Pipeline
//!
//! 1. **Configuration**: built-in or YAML station registry and crawl window
//! 2. **Crawl**: station jobs expand into range/day/item jobs, run with bounded concurrency
//! 3. **Output**: JSON lines on stdout, or the `stations/{id}/{YYYY}/{MM}/{DD}` archive

use broadcast_scrape::cli::Cli;
use broadcast_scrape::config::AppConfig;
use broadcast_scrape::fetch::HttpFetcher;
use broadcast_scrape::outputs::json;
use broadcast_scrape::runner::Runner;
use broadcast_scrape::scrapers::Job;
use broadcast_scrape::utils::ensure_writable_dir;
use chrono::{DateTime, Utc};
use clap::Parser;
use std::error::Error;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("broadcast_scrape starting up");

    let args = Cli::parse();
    debug!(?args.stations, ?args.config, ?args.json_output_dir, "Parsed CLI arguments");

    // Early check: ensure JSON output dir is writable
    if let Some(dir) = &args.json_output_dir {
        if let Err(e) = ensure_writable_dir(dir).await {
            error!(
                path = %dir,
                error = %e,
                "JSON output directory is not writable (fix perms or choose a different path)"
            );
            return Err(e);
        }
    }

    // ---- Configuration ----
    let config = match &args.config {
        Some(path) => AppConfig::load(Path::new(path)).await?,
        None => AppConfig::builtin()?,
    };
    let registry = config.registry()?;
    let seeds = if args.stations.is_empty() {
        registry
            .identifiers()
            .map(|id| registry.get(id).map(Job::station))
            .collect::<Result<Vec<_>, _>>()?
    } else {
        args.stations
            .iter()
            .map(|id| registry.get(id).map(Job::station))
            .collect::<Result<Vec<_>, _>>()?
    };
    let now: DateTime<Utc> = match &args.now {
        Some(s) => DateTime::parse_from_rfc3339(s)
            .map_err(|e| format!("--now '{}': {}", s, e))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };
    let concurrency = args.concurrency.unwrap_or(config.concurrency);
    info!(stations = seeds.len(), %now, concurrency, "Configured crawl");

    // ---- Crawl ----
    let fetcher = HttpFetcher::new(&args.user_agent, Duration::from_secs(args.timeout_secs))?;
    let outcome = Runner::new(&fetcher, now, config.window_policy(), concurrency)
        .run(seeds)
        .await;

    // ---- Output ----
    match &args.json_output_dir {
        Some(dir) => {
            let n = json::write_broadcasts(&outcome.broadcasts, dir).await?;
            info!(files = n, path = %dir, "Wrote archive");
        }
        None => json::print_broadcasts(&outcome.broadcasts, std::io::stdout().lock())?,
    }

    let elapsed = start_time.elapsed();
    let report = &outcome.report;
    info!(
        ?elapsed,
        broadcasts = outcome.broadcasts.len(),
        failed_jobs = report.failed,
        drops = ?report.drops,
        bytes = report.bytes,
        "Execution complete"
    );

    Ok(())
}
