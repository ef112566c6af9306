//! jobsift worker binary
//!
//! Each subcommand runs one pipeline stage to completion; a scheduler decides
//! when.

use anyhow::Result;
use clap::{Parser, Subcommand};
use jobsift::{
    config::{Config, LogFormat},
    pipeline::Pipeline,
};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "jobsift")]
#[command(about = "Scrape careers pages and batch-embed the jobs found")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "jobsift.toml")]
    config: PathBuf,

    /// Data directory
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Queue every company due for a scrape
    PublishStale,

    /// Drain the company queue and publish the jobs found
    Scrape,

    /// Drain job batches, persist them, and submit embedding batches
    Embed {
        /// Also buffer stored jobs that still have no embedding
        #[arg(long)]
        backfill: bool,
    },

    /// Apply finished embedding batches
    Reconcile,
}

fn init_logging(config: &Config, verbose: u8) -> Result<()> {
    let level = config.logging.level.raised_by(verbose);
    // RUST_LOG wins over config and flags
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.logging.with_target);
    match config.logging.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    }
    .map_err(|e| anyhow::anyhow!("Failed to install log subscriber: {}", e))
}

/// Cancel on Ctrl-C so in-flight work is settled before exit
fn shutdown_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, shutting down");
                trigger.cancel();
            }
            Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
        }
    });
    token
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load_or_default(&cli.config)?;
    if let Some(data_dir) = cli.data_dir {
        config.data.data_dir = data_dir;
    }
    init_logging(&config, cli.verbose)?;

    let pipeline = Pipeline::open(config)?;

    match cli.command {
        Commands::PublishStale => {
            let published = pipeline.publish_stale().await?;
            println!("Published {} companies", published);
        }
        Commands::Scrape => {
            let stats = pipeline.scrape(shutdown_on_ctrl_c()).await?;
            println!(
                "Scraped {} companies ({} failed, {} requeued), published {} jobs",
                stats.processed, stats.failed, stats.requeued, stats.jobs_published
            );
        }
        Commands::Embed { backfill } => {
            let report = pipeline.embed(backfill, shutdown_on_ctrl_c()).await?;
            println!(
                "Inserted {} jobs ({} skipped, {} filtered), submitted {} batches",
                report.inserted,
                report.skipped,
                report.filtered.total(),
                report.submitted_batches.len()
            );
            if report.left_buffered > 0 {
                println!("{} jobs left unsubmitted; rerun with --backfill", report.left_buffered);
            }
        }
        Commands::Reconcile => {
            let report = pipeline.reconcile().await?;
            println!(
                "Checked {} batches: {} completed, {} failed, {} processing; {} embeddings written",
                report.checked, report.completed, report.failed, report.still_processing, report.embeddings_written
            );
        }
    }

    Ok(())
}
