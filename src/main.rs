mod config;
mod engine;
mod error;
mod ml;
mod rates;
mod storage;
mod types;
mod web;

use anyhow::{bail, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use config::{default_config_toml, load_config, AppConfig};
use engine::{refresh_forecasts, run_training_blocking, JobManager, OutcomeState, PipelineOptions};
use ml::ModelStore;
use rates::{fetch_and_store, FrankfurterClient};
use storage::{read_metrics, ArtifactPaths};
use web::{start_dashboard_server, AppState};

#[derive(Parser)]
#[command(name = "fx-forecast")]
#[command(version)]
#[command(about = "EUR exchange-rate history, LSTM forecasts and dashboard", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true, default_value = "fx-forecast.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Download the historical rates and overwrite the local table
    Fetch,
    /// Train one model per currency, then evaluate and forecast
    Train {
        /// Delete every persisted model before training
        #[arg(long)]
        clean_slate: bool,
    },
    /// Recompute forecasts from persisted models without retraining
    Forecast,
    /// Delete every persisted model
    Clean,
    /// Print the persisted metrics table
    Metrics,
    /// Run the dashboard
    Serve {
        /// Dashboard port (defaults to the configured port)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Write the default configuration file
    InitConfig {
        #[arg(short, long, default_value = "fx-forecast.toml")]
        output: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json)?;

    info!("fx-forecast v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Fetch => {
            let (config, paths) = load(&cli.config)?;
            run_fetch(&config, &paths).await?;
        }
        Commands::Train { clean_slate } => {
            let (config, paths) = load(&cli.config)?;
            run_train(config, paths, clean_slate)?;
        }
        Commands::Forecast => {
            let (config, paths) = load(&cli.config)?;
            let forecasts = refresh_forecasts(&config, &paths)?;
            info!("Refreshed {} forecasts", forecasts.len());
        }
        Commands::Clean => {
            let (_, paths) = load(&cli.config)?;
            let removed = ModelStore::new(paths).clear_all()?;
            info!("Removed {} model files", removed.len());
        }
        Commands::Metrics => {
            let (_, paths) = load(&cli.config)?;
            show_metrics(&paths)?;
        }
        Commands::Serve { port } => {
            let (config, paths) = load(&cli.config)?;
            let port = port.unwrap_or(config.dashboard.port);
            serve(config, paths, port).await?;
        }
        Commands::InitConfig { output, force } => {
            write_default_config(&output, force)?;
        }
    }

    Ok(())
}

fn load(path: &Path) -> Result<(AppConfig, ArtifactPaths)> {
    let config = load_config(path)?;
    let paths = ArtifactPaths::from_config(&config);
    Ok((config, paths))
}

fn write_default_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", output.display());
    }
    std::fs::write(output, default_config_toml()?)?;
    info!("Wrote default configuration to {}", output.display());
    Ok(())
}

async fn run_fetch(config: &AppConfig, paths: &ArtifactPaths) -> Result<()> {
    let client = FrankfurterClient::new(&config.source)?;
    let today = Local::now().date_naive();
    fetch_and_store(&client, config, paths, today).await?;
    Ok(())
}

fn run_train(config: AppConfig, paths: ArtifactPaths, clean_slate: bool) -> Result<()> {
    let report = run_training_blocking(config, paths, PipelineOptions { clean_slate })?;

    println!("\n=== Training Summary ===");
    for outcome in &report.outcomes {
        match &outcome.state {
            OutcomeState::Persisted { metrics, .. } => println!(
                "{}: persisted | MAE {:.5} | RMSE {:.5} | R2 {:.4}",
                outcome.pair, metrics.mae, metrics.rmse, metrics.r2
            ),
            OutcomeState::Skipped { reason } => println!("{}: skipped ({})", outcome.pair, reason),
            OutcomeState::Failed { stage, error } => {
                println!("{}: failed at {} ({})", outcome.pair, stage, error)
            }
        }
    }
    println!("Metrics written to {}", report.metrics_file.display());

    if report.failed_count() > 0 {
        warn!("{} currencies failed", report.failed_count());
    }
    Ok(())
}

fn show_metrics(paths: &ArtifactPaths) -> Result<()> {
    let metrics = read_metrics(paths.metrics_file())?;

    println!("\n=== Validation Metrics ===");
    println!("{:<10} {:>10} {:>10} {:>8}", "Currency", "MAE", "RMSE", "R2");
    for m in metrics {
        println!("{:<10} {:>10.5} {:>10.5} {:>8.4}", m.currency, m.mae, m.rmse, m.r2);
    }
    Ok(())
}

async fn serve(config: AppConfig, paths: ArtifactPaths, port: u16) -> Result<()> {
    let source = Arc::new(FrankfurterClient::new(&config.source)?);
    let jobs = Arc::new(JobManager::new(config, paths, source));

    let mut updates = jobs.subscribe();
    tokio::spawn(async move {
        while let Ok(job) = updates.recv().await {
            debug!("Job {} is {}", job.id, job.status);
        }
    });

    let state = AppState::new(jobs);
    if let Err(e) = start_dashboard_server(state, port).await {
        error!("Dashboard server error: {}", e);
        return Err(e);
    }
    Ok(())
}
