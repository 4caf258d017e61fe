//! Notice Harvester main entry point
//!
//! This is the command-line interface for the notice harvester.

use anyhow::{bail, Context};
use clap::Parser;
use notice_harvester::config::{load_config_with_hash, Config, SourceConfig};
use notice_harvester::crawler::{harvest_sources, RunMode, RunOptions};
use notice_harvester::output::{load_statistics, print_statistics};
use notice_harvester::storage::{ItemStore, RunLedger, SnapshotStore};
use notice_harvester::url::page_url;
use notice_harvester::HarvestError;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use url::Url;

/// Notice Harvester: a resumable harvester for paginated publication listings
///
/// Walks the listing pages of each configured source, harvests every item that
/// is not yet in the source's snapshot, and extracts text from item pages and
/// their attached documents.
#[derive(Parser, Debug)]
#[command(name = "notice-harvester")]
#[command(version = "1.0.0")]
#[command(about = "A resumable harvester for paginated publication listings", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Harvest only these sources (repeatable); all sources by default
    #[arg(long = "source", value_name = "NAME")]
    sources: Vec<String>,

    /// Walk every listing page instead of the incremental page limit
    #[arg(long, conflicts_with = "max_pages")]
    full: bool,

    /// Page limit for this incremental run
    #[arg(long, value_name = "N")]
    max_pages: Option<u32>,

    /// First listing page to fetch
    #[arg(long, value_name = "N", default_value_t = 0)]
    start_page: u32,

    /// Harvest items again even if they are already stored
    #[arg(long)]
    force: bool,

    /// Remove stored items without usable content and exit
    #[arg(long, conflicts_with_all = ["stats", "dry_run"])]
    clean: bool,

    /// Show run history from the ledger and exit
    #[arg(long, conflicts_with_all = ["clean", "dry_run"])]
    stats: bool,

    /// Validate config and show what would be harvested without fetching anything
    #[arg(long, conflicts_with_all = ["clean", "stats"])]
    dry_run: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    let sources = select_sources(&config, &cli.sources)?;

    if cli.dry_run {
        handle_dry_run(&config, &sources, &cli)
    } else if cli.stats {
        handle_stats(&config, &cli.sources)
    } else if cli.clean {
        handle_clean(&config, &sources)
    } else {
        handle_harvest(config, sources, config_hash, &cli).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("notice_harvester=info,warn"),
            1 => EnvFilter::new("notice_harvester=debug,info"),
            2 => EnvFilter::new("notice_harvester=trace,debug"),
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

/// Resolves `--source` names; an empty selection means every source
fn select_sources(config: &Config, names: &[String]) -> anyhow::Result<Vec<SourceConfig>> {
    if names.is_empty() {
        return Ok(config.sources.clone());
    }
    names
        .iter()
        .map(|name| {
            config
                .source(name)
                .cloned()
                .ok_or_else(|| HarvestError::UnknownSource(name.clone()).into())
        })
        .collect()
}

fn run_options(cli: &Cli) -> RunOptions {
    RunOptions {
        mode: if cli.full {
            RunMode::Full
        } else {
            RunMode::Incremental {
                max_pages: cli.max_pages,
            }
        },
        start_page: cli.start_page,
        force: cli.force,
    }
}

/// Handles the --dry-run mode: validates config and shows what would be harvested
fn handle_dry_run(config: &Config, sources: &[SourceConfig], cli: &Cli) -> anyhow::Result<()> {
    println!("=== Notice Harvester Dry Run ===\n");

    println!("Fetch Configuration:");
    println!(
        "  Delay between requests: {}-{}ms",
        config.fetch.min_delay_ms, config.fetch.max_delay_ms
    );
    println!("  Attempts per request: {}", config.fetch.max_attempts);
    println!("  Max response size: {} bytes", config.fetch.max_bytes);
    println!(
        "  Renderer: {}",
        config.fetch.render_command.as_deref().unwrap_or("(none)")
    );
    println!(
        "  OCR: {}",
        config.extract.ocr_command.as_deref().unwrap_or("(none)")
    );

    println!("\nOutput:");
    println!("  Data directory: {}", config.output.data_dir.display());
    println!("  Run ledger: {}", config.output.ledger_path.display());

    let options = run_options(cli);
    println!("\nSources ({}):", sources.len());
    for source in sources {
        let max_pages = options.mode.max_pages(source, &config.harvest);
        println!(
            "  - {} (max pages: {})",
            source.name,
            max_pages.map_or_else(|| "unbounded".to_string(), |n| n.to_string())
        );
        let listing = Url::parse(&source.listing_url)
            .with_context(|| format!("invalid listing URL for {}", source.name))?;
        match page_url(&listing, &source.pagination, options.start_page) {
            Ok(url) => println!("    first page: {}", url),
            Err(e) => println!("    first page: {}", e),
        }
        println!(
            "    snapshot: {}",
            config.output.snapshot_path(&source.name).display()
        );
    }

    println!("\n✓ Configuration is valid");
    Ok(())
}

/// Handles the --stats mode: shows run history from the ledger
fn handle_stats(config: &Config, names: &[String]) -> anyhow::Result<()> {
    println!("Run ledger: {}\n", config.output.ledger_path.display());

    let ledger = RunLedger::new(&config.output.ledger_path)?;
    let source = match names {
        [one] => Some(one.as_str()),
        _ => None,
    };
    let stats = load_statistics(&ledger, source, 20)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --clean mode: drops stored items without usable content
fn handle_clean(config: &Config, sources: &[SourceConfig]) -> anyhow::Result<()> {
    for source in sources {
        let path = config.output.snapshot_path(&source.name);
        let mut store = SnapshotStore::open(&path)?;
        let removed = store.clean(config.harvest.clean_min_chars);
        store.save()?;
        println!(
            "{}: removed {} item(s), {} remaining",
            source.name,
            removed,
            store.len()
        );
    }
    Ok(())
}

/// Handles the main harvest operation
async fn handle_harvest(
    config: Config,
    sources: Vec<SourceConfig>,
    config_hash: String,
    cli: &Cli,
) -> anyhow::Result<()> {
    let mut ledger = RunLedger::new(&config.output.ledger_path)?;
    let interrupted = ledger.mark_stale_runs_interrupted()?;
    if interrupted > 0 {
        tracing::warn!("Marked {} unfinished run(s) as interrupted", interrupted);
    }
    let ledger = Arc::new(Mutex::new(ledger));

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, stopping after the current item");
                cancel.cancel();
            }
        });
    }

    let options = run_options(cli);
    tracing::info!(
        "Harvesting {} source(s) in {} mode",
        sources.len(),
        options.mode.name()
    );

    let results = harvest_sources(
        Arc::new(config),
        sources,
        options,
        cancel,
        Some(ledger),
        config_hash,
    )
    .await;

    let mut fatal = Vec::new();
    for (name, result) in results {
        match result {
            Ok(summary) => {
                if !cli.quiet {
                    summary.print_summary();
                }
            }
            Err(e @ (HarvestError::Storage(_) | HarvestError::Config(_))) => {
                fatal.push(format!("{}: {}", name, e));
            }
            Err(e) => {
                tracing::error!("{}: {}", name, e);
            }
        }
    }

    if !fatal.is_empty() {
        bail!("harvest failed: {}", fatal.join("; "));
    }
    Ok(())
}
