mod config;
mod engine;
mod error;
mod indicators;
mod market;
mod ml;
mod types;
mod web;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::Duration;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use config::ForecastConfig;
use engine::{PredictionService, PretrainOutcome};
use market::YahooClient;
use ml::FileArtifactCache;
use web::{start_server, AppState};

const DEFAULT_PRETRAIN_TICKERS: [&str; 3] = ["AAPL", "MSFT", "TSLA"];

#[derive(Parser)]
#[command(name = "price-forecaster")]
#[command(version = "0.1.0")]
#[command(about = "Short-horizon price direction forecasts from technical-indicator sequences", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "forecaster.toml", global = true)]
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
    /// Start the HTTP API
    Serve {
        /// Listen port (overrides server.port)
        #[arg(short, long)]
        port: Option<u16>,
        /// Train the default tickers before serving
        #[arg(long)]
        pretrain: bool,
    },
    /// Train (or confirm cached) models for a list of tickers
    Pretrain {
        /// Comma-separated tickers
        #[arg(short, long, value_delimiter = ',', default_value = "AAPL,MSFT,TSLA")]
        tickers: Vec<String>,
    },
    /// Run a single forecast and print it as JSON
    Predict {
        #[arg(short, long)]
        ticker: String,
        /// Ignore any cached model
        #[arg(long)]
        force_retrain: bool,
    },
    /// List cached model metadata
    Cached,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json)?;

    let config = ForecastConfig::load(Some(cli.config.as_path()))?;
    config
        .validate()
        .map_err(|errors| anyhow!("Invalid configuration: {}", errors.join(", ")))?;

    info!("Price Forecaster v0.1.0");
    let service = Arc::new(build_service(&config)?);

    match cli.command {
        Commands::Serve { port, pretrain } => {
            if pretrain {
                let tickers: Vec<String> = DEFAULT_PRETRAIN_TICKERS.iter().map(|t| t.to_string()).collect();
                run_pretrain(&service, &tickers).await;
            }
            let port = port.unwrap_or(config.server.port);
            start_server(AppState::new(service), &config.server.host, port).await?;
        }
        Commands::Pretrain { tickers } => {
            run_pretrain(&service, &tickers).await;
        }
        Commands::Predict { ticker, force_retrain } => {
            let record = service.predict(&ticker, force_retrain).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Commands::Cached => {
            let models = service.cache().list();
            if models.is_empty() {
                println!("No cached models in {}", config.model.cache_dir.display());
            }
            for m in models {
                println!(
                    "{:<10} {}d  acc {:>6.2}%  auc {:.4}  trained {}",
                    m.ticker,
                    m.horizon,
                    m.accuracy * 100.0,
                    m.auc,
                    m.trained_at
                );
            }
        }
    }

    Ok(())
}

fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
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

fn build_service(config: &ForecastConfig) -> Result<PredictionService> {
    let source = YahooClient::new(&config.data)?;
    let cache = FileArtifactCache::new(
        config.model.cache_dir.clone(),
        Duration::days(config.model.cache_expiry_days),
    );
    info!(
        "Model cache at {} ({} stored)",
        config.model.cache_dir.display(),
        ml::ArtifactCache::count(&cache)
    );

    Ok(PredictionService::new(
        Arc::new(source),
        Arc::new(cache),
        config.model.clone(),
        config.training.clone(),
    ))
}

async fn run_pretrain(service: &PredictionService, tickers: &[String]) {
    info!("Pre-training {} models", tickers.len());
    let outcomes = service.pretrain(tickers).await;

    println!("\n=== Pre-training Summary ===");
    let mut failed = 0;
    for (ticker, outcome) in &outcomes {
        match outcome {
            Ok(o) => {
                let status = match o {
                    PretrainOutcome::Cached(_) => "cached",
                    PretrainOutcome::Trained(_) => "trained",
                };
                let m = o.metadata();
                println!(
                    "{}: Accuracy={:.2}%, AUC={:.4} ({})",
                    ticker,
                    m.accuracy * 100.0,
                    m.auc,
                    status
                );
            }
            Err(e) => {
                failed += 1;
                println!("{}: FAILED - {}", ticker, e);
            }
        }
    }
    if failed > 0 {
        warn!("{} of {} tickers failed to pretrain", failed, outcomes.len());
    }
}

#[cfg(test)]
mod test_support {
    use chrono::{Duration, NaiveDate};
    use rust_decimal::Decimal;

    use crate::types::{Bar, PriceSeries};

    /// Daily bars from 2024-01-01 with the given closes, a two-point
    /// high/low range and a weekly volume pattern.
    pub(crate) fn synthetic_series(closes: &[f64]) -> PriceSeries {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, close)| {
                let close = Decimal::try_from(*close).unwrap();
                Bar {
                    date: start + Duration::days(i as i64),
                    open: close,
                    high: close + Decimal::ONE,
                    low: close - Decimal::ONE,
                    close,
                    volume: Decimal::from(1000 + (i % 7) as i64 * 100),
                }
            })
            .collect();
        PriceSeries::new(bars)
    }
}
