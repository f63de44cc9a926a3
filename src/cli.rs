//! Command-line interface definitions.
//!
//! Arguments can be given as flags or, where noted, environment variables.

use clap::Parser;

/// Default `User-Agent` header of outgoing requests.
pub const DEFAULT_USER_AGENT: &str = concat!("broadcast_scrape/", env!("CARGO_PKG_VERSION"));

/// Command-line arguments.
///
/// # Examples
///
/// ```sh
/// # All built-in stations, JSON lines on stdout
/// broadcast_scrape
///
/// # Two stations into an archive directory
/// broadcast_scrape b2 dlf -j ./archive
///
/// # Reproducible run against a fixed instant
/// broadcast_scrape b4 --now 2015-11-30T05:00:00+01:00
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Station identifiers to scrape (default: all configured stations)
    pub stations: Vec<String>,

    /// Optional path to a stations YAML file replacing the built-in one
    #[arg(short, long, env = "BROADCAST_SCRAPE_CONFIG")]
    pub config: Option<String>,

    /// Write one JSON file per broadcast below this directory instead of
    /// printing JSON lines
    #[arg(short, long)]
    pub json_output_dir: Option<String>,

    /// Maximum number of jobs in flight (overrides the configuration)
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Reference instant of the crawl window, RFC 3339 (default: now)
    #[arg(long)]
    pub now: Option<String>,

    /// User-Agent header for HTTP requests
    #[arg(long, env = "BROADCAST_SCRAPE_USER_AGENT", default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,

    /// HTTP request timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,
}
