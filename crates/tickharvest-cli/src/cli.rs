//! CLI argument definitions for tickharvest.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `proxies` | Harvest and validate proxies, write the artifact |
//! | `fetch` | Fetch quotes for a symbol batch |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--config` | none | JSON pipeline config |
//! | `--log-level` | `info` | Default filter when `RUST_LOG` is unset |
//! | `--log-dir` | none | Directory for daily-rotated log files |
//! | `--pretty` | `false` | Pretty-print the JSON summary |
//!
//! # Examples
//!
//! ```bash
//! tickharvest proxies --min-working 30 --output working_proxies.json
//! tickharvest fetch AAPL MSFT --proxies working_proxies.json --output run.csv
//! tickharvest fetch --symbols-file tickers.txt --harvest --min-success-rate 90
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Harvest public proxies and fetch quote batches through them.
#[derive(Debug, Parser)]
#[command(name = "tickharvest", author, version, about)]
pub struct Cli {
    /// JSON pipeline configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Default log filter; `RUST_LOG` takes precedence.
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Also write daily-rotated logs into this directory.
    #[arg(long, global = true)]
    pub log_dir: Option<String>,

    /// Pretty-print the JSON summary.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Harvest proxy lists, validate candidates and write the artifact.
    ///
    ///   tickharvest proxies --workers 80 --min-working 25
    Proxies(ProxiesArgs),

    /// Fetch quotes for a batch of symbols.
    ///
    ///   tickharvest fetch AAPL MSFT GOOGL
    ///   tickharvest fetch --symbols-file tickers.txt --proxies working_proxies.json
    Fetch(FetchArgs),
}

/// Validation knobs shared by `proxies` and `fetch --harvest`.
#[derive(Debug, Clone, Default, Args)]
pub struct HarvestArgs {
    /// Stop dispatching validations once this many proxies work.
    #[arg(long)]
    pub min_working: Option<usize>,

    /// Validate at most this many shuffled candidates.
    #[arg(long)]
    pub max_candidates: Option<usize>,
}

#[derive(Debug, Args)]
pub struct ProxiesArgs {
    /// Concurrent validations.
    #[arg(long)]
    pub workers: Option<usize>,

    /// Per-request validation timeout in seconds.
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    #[command(flatten)]
    pub harvest: HarvestArgs,

    /// Artifact path.
    #[arg(long, default_value = "working_proxies.json")]
    pub output: PathBuf,
}

#[derive(Debug, Args)]
pub struct FetchArgs {
    /// Ticker symbols.
    #[arg(num_args = 0..)]
    pub symbols: Vec<String>,

    /// File with symbols separated by newlines, commas or spaces; `#` starts
    /// a comment.
    #[arg(long)]
    pub symbols_file: Option<PathBuf>,

    /// Concurrent retrieval workers.
    #[arg(long)]
    pub workers: Option<usize>,

    /// Per-attempt timeout in seconds.
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Attempts per symbol, including the first.
    #[arg(long)]
    pub retries: Option<u32>,

    /// Load the proxy pool from an artifact written by `proxies`.
    #[arg(long, conflicts_with = "harvest")]
    pub proxies: Option<PathBuf>,

    /// Harvest and validate a fresh pool before fetching.
    #[arg(long, default_value_t = false)]
    pub harvest: bool,

    #[command(flatten)]
    pub harvest_args: HarvestArgs,

    /// Write the report here; the extension selects JSON or CSV.
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Required success rate in percent.
    #[arg(long)]
    pub min_success_rate: Option<f64>,

    /// Wall-clock budget in seconds.
    #[arg(long)]
    pub time_budget_secs: Option<u64>,
}
