//! Crawl-Ledger main entry point
//!
//! This is the command-line interface for the Crawl-Ledger issue crawler.

use anyhow::Context;
use clap::Parser;
use crawl_ledger::config::{load_config_with_hash, Config};
use crawl_ledger::crawler::{open_store, run_crawl_with_store};
use crawl_ledger::output::print_status;
use crawl_ledger::StateStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Crawl-Ledger: a resumable issue-tracker crawler
///
/// Crawl-Ledger pages through the issues of each configured project, fetches
/// every issue politely, writes training tasks as JSONL and records progress
/// so an interrupted crawl picks up where it stopped.
#[derive(Parser, Debug)]
#[command(name = "crawl-ledger")]
#[command(version)]
#[command(about = "A resumable, rate-limited issue-tracker crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Show saved progress and output files, then exit
    #[arg(long, conflicts_with_all = ["reset", "dry_run", "fresh"])]
    status: bool,

    /// Clear saved progress for one partition, then exit
    #[arg(long, value_name = "PARTITION", conflicts_with_all = ["dry_run", "fresh"])]
    reset: Option<String>,

    /// Clear saved progress for every configured partition before crawling
    #[arg(long)]
    fresh: bool,

    /// Validate config and show what would be crawled without crawling
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    let store = Arc::new(open_store(&config).context("Failed to open state store")?);

    // Handle different modes
    if cli.status {
        handle_status(&config, &store).await
    } else if let Some(partition) = cli.reset.as_deref() {
        handle_reset(&store, partition).await
    } else if cli.dry_run {
        handle_dry_run(&config, &store).await
    } else {
        handle_crawl(&config, store, cli.fresh).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("crawl_ledger=info,warn"),
            1 => EnvFilter::new("crawl_ledger=debug,info"),
            2 => EnvFilter::new("crawl_ledger=trace,debug"),
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

/// Handles --status: prints saved progress and output file statistics
async fn handle_status(config: &Config, store: &StateStore) -> anyhow::Result<()> {
    let summaries = store
        .summaries()
        .await
        .context("Failed to read saved progress")?;
    print_status(&summaries, &config.output.directory);
    Ok(())
}

/// Handles --reset: clears one partition's progress
async fn handle_reset(store: &StateStore, partition: &str) -> anyhow::Result<()> {
    store
        .reset(partition)
        .await
        .with_context(|| format!("Failed to reset partition {}", partition))?;
    println!("✓ Reset progress for {}", partition);
    Ok(())
}

/// Handles --dry-run: shows the configuration and where each partition would resume
async fn handle_dry_run(config: &Config, store: &StateStore) -> anyhow::Result<()> {
    println!("=== Crawl-Ledger Dry Run ===\n");

    println!("Source:");
    println!("  Base URL: {}", config.source.base_url);
    println!("  Page size: {}", config.source.page_size);
    println!("  Max retries: {}", config.source.max_retries);
    println!("  User agent: {}", config.source.user_agent);

    println!("\nCrawler:");
    println!("  Workers: {}", config.crawler.worker_count);
    println!("  Queue capacity: {}", config.crawler.queue_capacity);
    println!("  Min interval: {}ms", config.rate_limit.min_interval_ms);

    println!("\nState: {} ({})", config.state.directory.display(), config.state.backend);
    println!("Output: {}", config.output.directory.display());

    println!("\nPartitions ({}):", config.partitions.len());
    for partition in &config.partitions {
        let state = store
            .state(partition)
            .await
            .with_context(|| format!("Failed to load state for {}", partition))?;
        if state.is_fresh() {
            println!("  - {} (fresh)", partition);
        } else {
            println!(
                "  - {} (resume at cursor {}, {} processed)",
                partition, state.cursor, state.processed_count
            );
        }
    }

    println!("\n✓ Configuration is valid");
    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: &Config, store: Arc<StateStore>, fresh: bool) -> anyhow::Result<()> {
    if fresh {
        tracing::info!("Starting fresh crawl (clearing previous progress)");
        for partition in &config.partitions {
            store
                .reset(partition)
                .await
                .with_context(|| format!("Failed to reset partition {}", partition))?;
        }
    } else {
        tracing::info!("Starting crawl (will resume from saved progress)");
    }

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let report = run_crawl_with_store(config, store, shutdown)
        .await
        .context("Crawl failed")?;

    println!("\n=== Crawl Report ===");
    println!("Processed: {}", report.items_processed);
    println!("Failed: {}", report.items_failed);
    println!("Skipped: {}", report.items_skipped);
    println!("Elapsed: {:.1}s", report.elapsed.as_secs_f64());
    for (partition, state) in &report.partitions {
        println!("  {}: {}", partition, state);
    }
    if !report.is_complete() {
        println!("\nCrawl stopped early; run again to resume.");
    }

    Ok(())
}
