//! IPGeo Ingest - IP location dataset ingestion tool

use anyhow::Result;
use clap::{Parser, Subcommand};
use ipgeo_common::error_chain;
use ipgeo_common::logging::{init_logging, LogConfig, LogLevel};
use ipgeo_ingest::config::Settings;
use ipgeo_ingest::db::{create_pool, run_migrations};
use ipgeo_ingest::http::HttpClient;
use ipgeo_ingest::version_discovery::SourceLocator;
use ipgeo_ingest::version_store::VersionStore;
use ipgeo_ingest::{Pipeline, PipelineOutcome, RunMode};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "ipgeo-ingest")]
#[command(author, version, about = "IP location dataset ingestion tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Keep the downloaded file after a successful run
    #[arg(long, global = true, env = "IPGEO_DEBUG")]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download and promote the latest dataset if it is not loaded yet
    Run,

    /// Show the dataset version currently loaded
    Status,

    /// Resolve the latest dataset link without downloading it
    Locate,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("ipgeo-ingest")
        .build();

    // Environment variables take precedence
    let log_config = match log_config.merge_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid logging configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    let _guard = match init_logging(&log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            return ExitCode::FAILURE;
        },
    };

    match execute(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Ingestion failed: {}", error_chain(&*e));
            ExitCode::FAILURE
        },
    }
}

async fn execute(cli: Cli) -> Result<()> {
    let settings = Settings::load()?;

    match cli.command {
        Command::Run => {
            let pool = create_pool(&settings.database).await?;
            run_migrations(&pool).await?;

            let run_mode = if cli.debug {
                RunMode::Debug
            } else {
                RunMode::Normal
            };

            match Pipeline::new(pool, &settings.ingest, run_mode)?.run().await? {
                PipelineOutcome::UpToDate { version } => {
                    info!(%version, "Already up to date");
                },
                PipelineOutcome::Refreshed {
                    version,
                    rows,
                    batches,
                } => {
                    info!(%version, rows, batches, "Dataset refreshed");
                },
            }
        },
        Command::Status => {
            let pool = create_pool(&settings.database).await?;
            run_migrations(&pool).await?;

            match VersionStore::new(pool).current_version().await? {
                Some(version) => println!("Loaded dataset version: {version}"),
                None => println!("Loaded dataset version: never loaded"),
            }
        },
        Command::Locate => {
            let ingest = &settings.ingest;
            let client =
                HttpClient::new(Duration::from_secs(ingest.http_timeout_secs), ingest.retry)?;
            let locator =
                SourceLocator::new(client, ingest.page_url.clone(), &ingest.download_base_url)?;
            let source = locator.locate_latest().await?;

            println!("URL:      {}", source.url);
            println!("Filename: {}", source.filename);
            println!("Version:  {}", source.version);
        },
    }

    Ok(())
}
