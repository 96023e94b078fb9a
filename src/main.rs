//! Lex-Harvest main entry point
//!
//! This is the command-line interface for the Lex-Harvest legal-text harvester.

use anyhow::Context;
use clap::Parser;
use lex_harvest::config::{load_config_or_default, Config};
use lex_harvest::crawler::run_harvest;
use lex_harvest::output::{load_statistics, print_run_report, print_statistics};
use lex_harvest::storage::open_ledger;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Lex-Harvest: an incremental legal-text harvester
///
/// Each run pages the search service from the saved checkpoint, fetches the
/// full text of every resolvable document up to the batch cap, publishes the
/// batch to the dataset repository and then advances the checkpoint.
#[derive(Parser, Debug)]
#[command(name = "lex-harvest")]
#[command(version)]
#[command(about = "An incremental legal-text harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (defaults are used if it does not exist)
    #[arg(short, long, value_name = "CONFIG", default_value = "lex-harvest.toml")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Page, resolve and fetch, but publish nothing and keep the checkpoint
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the run ledger and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let (config, config_hash) = match load_config_or_default(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::debug!("Configuration loaded (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e).with_context(|| format!("loading {}", cli.config.display()));
        }
    };

    if cli.stats {
        handle_stats(&config)
    } else {
        handle_run(&config, &config_hash, cli.dry_run).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("lex_harvest=info,warn"),
            1 => EnvFilter::new("lex_harvest=debug,info"),
            2 => EnvFilter::new("lex_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --stats mode: shows statistics from the ledger
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Ledger: {}\n", config.state.ledger_path);

    let ledger = open_ledger(Path::new(&config.state.ledger_path))
        .with_context(|| format!("opening ledger {}", config.state.ledger_path))?;
    let stats = load_statistics(&ledger).context("reading ledger statistics")?;
    print_statistics(&stats);

    Ok(())
}

/// Handles a harvest run
async fn handle_run(config: &Config, config_hash: &str, dry_run: bool) -> anyhow::Result<()> {
    match run_harvest(config, config_hash, dry_run).await {
        Ok(report) => {
            print_run_report(&report);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Harvest failed: {}", e);
            Err(e.into())
        }
    }
}
