use std::fs::{self, OpenOptions};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use regcrawl_client::{ChromiumDriver, LaunchOptions};
use regcrawl_core::{
    CrawlConfig, Ledger, Orchestrator, Politeness, ProgressStore, Region, RunSummary, Statistics,
    TracingReporter, default_regions, select_regions,
};

/// Conventional exit status for termination by SIGINT.
const INTERRUPTED_EXIT_CODE: i32 = 130;

#[derive(Parser)]
#[command(
    name = "regcrawl",
    version,
    about = "Resumable crawler for paginated public registries"
)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl regions, skipping everything already on disk
    Crawl(CrawlArgs),

    /// Show per-region completion and ledger sizes
    Status {
        /// Directory holding ledgers and progress.json
        #[arg(short, long, env = "REGCRAWL_OUTPUT_DIR", default_value = "registry_data")]
        output_dir: PathBuf,
    },

    /// List the region table
    Regions,
}

#[derive(Args)]
struct CrawlArgs {
    /// Directory for ledgers, progress.json, statistics.json and crawler.log
    #[arg(short, long, env = "REGCRAWL_OUTPUT_DIR", default_value = "registry_data")]
    output_dir: PathBuf,

    /// Only crawl these region codes (repeatable; table order is kept)
    #[arg(short, long = "region", value_name = "CODE", env = "REGCRAWL_REGIONS", value_delimiter = ',')]
    regions: Vec<String>,

    /// Session setup attempts per region
    #[arg(long, env = "REGCRAWL_SETUP_ATTEMPTS", default_value_t = 3)]
    setup_attempts: u32,

    /// Shortest pause between detail pages, in milliseconds
    #[arg(long, env = "REGCRAWL_MIN_WAIT_MS", default_value_t = 2000)]
    min_wait_ms: u64,

    /// Longest pause between detail pages, in milliseconds
    #[arg(long, env = "REGCRAWL_MAX_WAIT_MS", default_value_t = 4000)]
    max_wait_ms: u64,

    /// Show the browser window
    #[arg(long, env = "REGCRAWL_HEADFUL", default_value_t = false)]
    headful: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    match cli.command {
        Commands::Crawl(args) => {
            fs::create_dir_all(&args.output_dir).with_context(|| {
                format!("Failed to create output dir: {}", args.output_dir.display())
            })?;
            let log_path = CrawlConfig::default()
                .with_output_dir(&args.output_dir)
                .log_path();
            init_tracing(cli.verbose, Some(&log_path))?;
            cmd_crawl(args).await?;
        }
        Commands::Status { output_dir } => {
            init_tracing(cli.verbose, None)?;
            cmd_status(&output_dir)?;
        }
        Commands::Regions => {
            init_tracing(cli.verbose, None)?;
            cmd_regions();
        }
    }

    Ok(())
}

/// Stderr logging, plus an append-only plain-text log file when given.
fn init_tracing(verbose: u8, log_file: Option<&Path>) -> Result<()> {
    let level = match verbose {
        0 => "regcrawl=info",
        1 => "regcrawl=debug",
        _ => "regcrawl=trace",
    };
    let filter = EnvFilter::from_default_env().add_directive(level.parse()?);

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .init();
    Ok(())
}

async fn cmd_crawl(args: CrawlArgs) -> Result<()> {
    let config = CrawlConfig::default()
        .with_output_dir(&args.output_dir)
        .with_setup_attempts(args.setup_attempts)
        .with_politeness(Politeness::new(
            Duration::from_millis(args.min_wait_ms),
            Duration::from_millis(args.max_wait_ms),
        ));
    config.validate()?;

    let table = default_regions();
    let regions = select_regions(&table, &args.regions).map_err(|unknown| {
        anyhow::anyhow!("Unknown region code(s): {}", unknown.join(", "))
    })?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if second_interrupt(tokio::signal::ctrl_c, cancel).await {
                tracing::error!("Second interrupt, exiting without cleanup");
                std::process::exit(INTERRUPTED_EXIT_CODE);
            }
        }
    });

    tracing::info!(
        regions = regions.len(),
        output_dir = %config.output_dir.display(),
        "Starting crawl"
    );

    let mut stats = Statistics::new();
    let options = LaunchOptions {
        headless: !args.headful,
        page_load_timeout: config.page_load_timeout,
        ..LaunchOptions::default()
    };

    let result = match ChromiumDriver::launch(options).await {
        Ok(driver) => {
            let result = run_crawl(&driver, &config, regions, table.len(), &mut stats, &cancel).await;
            if let Err(e) = driver.close().await {
                tracing::warn!(error = %e, "Failed to close browser cleanly");
            }
            result
        }
        Err(e) => Err(anyhow::Error::from(e).context("Failed to launch browser")),
    };

    // Runs on success, interrupt and error alike.
    if let Err(e) = stats.save(&config.stats_path()) {
        tracing::error!(error = %e, "Failed to save statistics");
    }
    stats.print_summary();

    let summary = result?;
    if summary.interrupted {
        anyhow::bail!("Crawl interrupted; run again to resume");
    }
    Ok(())
}

/// Cancels `cancel` on the first interrupt and resolves to `true` on the
/// second. `false` when the signal source fails.
async fn second_interrupt<F, Fut>(mut interrupts: F, cancel: CancellationToken) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if interrupts().await.is_err() {
        return false;
    }
    tracing::warn!("Interrupt received, stopping after the current step (Ctrl-C again to force quit)");
    cancel.cancel();

    interrupts().await.is_ok()
}

async fn run_crawl(
    driver: &ChromiumDriver,
    config: &CrawlConfig,
    regions: Vec<Region>,
    total_regions: usize,
    stats: &mut Statistics,
    cancel: &CancellationToken,
) -> Result<RunSummary> {
    let mut orchestrator = Orchestrator::new(driver, config.clone(), regions)?
        .with_total_regions(total_regions);
    let summary = orchestrator
        .run(stats, cancel, &TracingReporter)
        .await
        .context("Crawl aborted")?;

    tracing::info!(
        completed = summary.completed,
        already_done = summary.already_done,
        setup_failed = summary.setup_failed,
        "Run finished: {}",
        orchestrator.completion_ratio()
    );
    Ok(summary)
}

fn cmd_status(output_dir: &Path) -> Result<()> {
    let config = CrawlConfig::default().with_output_dir(output_dir);
    let progress = ProgressStore::open(config.progress_path())?;
    let ledger = Ledger::new(config.ledger_dir());
    let regions = default_regions();

    println!("{:<6} {:<10} {:<6} {:>8}", "Code", "Region", "Done", "Records");
    for region in &regions {
        let rows = ledger
            .count_rows(region)
            .with_context(|| format!("Failed to read ledger for {region}"))?;
        let done = if progress.is_done(&region.code) { "yes" } else { "-" };
        println!("{:<6} {:<10} {:<6} {:>8}", region.code, region.name, done, rows);
    }
    println!();
    println!("{}", progress.completion_ratio(regions.len()));

    Ok(())
}

fn cmd_regions() {
    for region in default_regions() {
        println!("{}  {}", region.code, region.name);
    }
}
