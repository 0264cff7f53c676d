mod checkpoint;
mod config;
mod error;
mod extract;
mod fetch;
mod output;
mod pipeline;
mod record;
mod skipped;
mod validate;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use crate::checkpoint::{CheckpointStore, DEFAULT_CHECKPOINT_DIR};
use crate::config::ScrapeConfig;
use crate::fetch::HttpFetcher;
use crate::pipeline::{Pipeline, RunSummary};
use crate::skipped::{SkippedLog, DEFAULT_SKIPPED_LOG};

#[derive(Parser)]
#[command(name = "mankan_scraper", about = "Mankan.me nutritional database scraper")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape the id range, checkpointing as it goes
    Scrape {
        /// First food item id
        #[arg(long, default_value_t = 3)]
        start_id: u32,
        /// Last food item id (inclusive)
        #[arg(long, default_value_t = 1967)]
        end_id: u32,
        /// Resume from the last checkpoint
        #[arg(long)]
        resume: bool,
        /// Save a checkpoint every N completed items
        #[arg(long, default_value_t = 50)]
        checkpoint_frequency: usize,
        /// Minimum delay between requests in seconds
        #[arg(long, default_value_t = 0.5)]
        delay_min: f64,
        /// Maximum delay between requests in seconds
        #[arg(long, default_value_t = 1.5)]
        delay_max: f64,
        /// Output directory for the CSV file
        #[arg(long, default_value = "output")]
        output_dir: PathBuf,
        /// CSV output filename
        #[arg(long, default_value = "mankan_nutritional_data.csv")]
        csv_filename: String,
    },
    /// Re-run the ids recorded in the skipped-items log
    RetrySkipped {
        #[arg(long, default_value_t = 0.5)]
        delay_min: f64,
        #[arg(long, default_value_t = 1.5)]
        delay_max: f64,
        #[arg(long, default_value = "output")]
        output_dir: PathBuf,
        #[arg(long, default_value = "mankan_nutritional_data.csv")]
        csv_filename: String,
    },
    /// Show checkpoint and skipped-item counts
    Stats,
    /// Delete the checkpoint for a fresh start
    Reset {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Scrape {
            start_id,
            end_id,
            resume,
            checkpoint_frequency,
            delay_min,
            delay_max,
            output_dir,
            csv_filename,
        } => {
            let config = ScrapeConfig {
                start_id,
                end_id,
                resume,
                checkpoint_frequency,
                delay_min,
                delay_max,
                output_dir,
                csv_filename,
            };
            run_scrape(config).await
        }
        Commands::RetrySkipped {
            delay_min,
            delay_max,
            output_dir,
            csv_filename,
        } => {
            let config = ScrapeConfig {
                resume: true,
                delay_min,
                delay_max,
                output_dir,
                csv_filename,
                ..Default::default()
            };
            run_retry_skipped(config).await
        }
        Commands::Stats => {
            let state = CheckpointStore::new(DEFAULT_CHECKPOINT_DIR)
                .load()?
                .unwrap_or_default();
            let skipped = SkippedLog::open(DEFAULT_SKIPPED_LOG);
            println!("Completed ids: {}", state.completed_ids.len());
            println!("Records:       {}", state.records.len());
            println!(
                "Last saved:    {}",
                state
                    .last_saved
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "never".to_string())
            );
            println!("Skipped items: {}", skipped.len());
            Ok(())
        }
        Commands::Reset { yes } => {
            if !yes {
                println!("Refusing to delete the checkpoint without --yes.");
                return Ok(());
            }
            CheckpointStore::new(DEFAULT_CHECKPOINT_DIR).reset()?;
            println!("Checkpoint cleared.");
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

async fn run_scrape(config: ScrapeConfig) -> Result<()> {
    config.validate()?;
    info!("Mankan.me nutritional database scraper");
    info!("ID range: {}-{}", config.start_id, config.end_id);
    info!("Checkpoint frequency: {}", config.checkpoint_frequency);
    info!(
        "Request delay: {}-{} seconds",
        config.delay_min, config.delay_max
    );
    if config.resume {
        info!("Resuming from checkpoint");
    } else {
        info!("Starting fresh scrape (use --resume to continue from checkpoint)");
    }

    let fetcher = HttpFetcher::new(config.delay_min, config.delay_max)?;
    let store = CheckpointStore::new(DEFAULT_CHECKPOINT_DIR);
    let skipped = SkippedLog::open(DEFAULT_SKIPPED_LOG);
    let csv_path = config.csv_path();

    let pipeline = Pipeline::new(config, fetcher, store, skipped)?;
    let (summary, records) = pipeline.run().await?;

    output::write_csv(&csv_path, &records)?;
    print_summary(&summary, &csv_path);
    Ok(())
}

async fn run_retry_skipped(config: ScrapeConfig) -> Result<()> {
    config.validate()?;
    let skipped = SkippedLog::open(DEFAULT_SKIPPED_LOG);
    let ids = skipped.ids();
    if ids.is_empty() {
        println!("No skipped items to retry.");
        return Ok(());
    }
    println!("Retrying {} skipped ids...", ids.len());

    let fetcher = HttpFetcher::new(config.delay_min, config.delay_max)?;
    let store = CheckpointStore::new(DEFAULT_CHECKPOINT_DIR);
    let csv_path = config.csv_path();

    let mut pipeline = Pipeline::new(config, fetcher, store, skipped)?;
    pipeline.reopen(&ids);
    let (summary, records) = pipeline.run_ids(ids).await?;

    output::write_csv(&csv_path, &records)?;
    print_summary(&summary, &csv_path);
    Ok(())
}

fn print_summary(summary: &RunSummary, csv_path: &Path) {
    println!("Items attempted: {}", summary.attempted);
    println!("  with records:  {}", summary.with_records);
    println!("  zero records:  {}", summary.zero_records);
    println!("  failed:        {}", summary.failed);
    println!("Rows rejected:   {}", summary.rejected_rows);
    println!("Total records:   {}", summary.total_records);
    println!("CSV file: {}", csv_path.display());
    if summary.failed > 0 {
        println!("Use 'mankan_scraper retry-skipped' to retry failed items.");
    }
    if summary.interrupted {
        println!("Interrupted; continue with 'mankan_scraper scrape --resume'.");
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
