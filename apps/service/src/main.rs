use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tokio::signal;
use tracing::info;

use upwatch::Engine;
use upwatch::config::{Config, minutes};

#[derive(Debug, Parser)]
#[command(version, about = "Single-node uptime and bandwidth monitor")]
struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/upwatch/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the database path from the config file
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Override the monitored targets (comma-separated URLs)
    #[arg(long, global = true, value_delimiter = ',')]
    targets: Option<Vec<String>>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the monitoring engine until interrupted (default)
    Run,
    /// Print one query result as JSON
    Report {
        #[arg(value_enum)]
        query: Report,
        /// Trailing window, defaults to `query.window_minutes`
        #[arg(long)]
        window_minutes: Option<u64>,
        /// SLA threshold, defaults to `query.latency_threshold_ms`
        #[arg(long)]
        latency_threshold_ms: Option<i64>,
    },
    /// Print the effective configuration
    Config,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Report {
    Status,
    Summary,
    Uptime,
    Speedtests,
    Size,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    logger::init();

    let cli = Cli::parse();
    let mut config = Config::from_config(cli.config.as_ref()).context("failed to load configuration")?;
    if let Some(db) = cli.db {
        config.database.path = db;
    }
    if let Some(targets) = cli.targets {
        config.monitor.targets = targets;
    }

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::Report { query, window_minutes, latency_threshold_ms } => {
            report(config, query, window_minutes, latency_threshold_ms).await
        }
        Command::Config => {
            print!("{config}");
            Ok(())
        }
    }
}

async fn run(config: Config) -> Result<()> {
    info!("upwatch {} starting", env!("CARGO_PKG_VERSION"));

    let engine = Engine::open(config).await?;
    let handle = engine.start();

    shutdown_signal().await?;
    handle.shutdown().await;
    Ok(())
}

async fn report(
    config: Config,
    query: Report,
    window_minutes: Option<u64>,
    latency_threshold_ms: Option<i64>,
) -> Result<()> {
    let window = window_minutes.map(minutes).unwrap_or_else(|| config.query.window());
    let threshold = latency_threshold_ms.unwrap_or(config.query.latency_threshold_ms);
    let aggregator = Engine::open(config).await?.aggregator();

    match query {
        Report::Status => print_json(&aggregator.status_snapshot(window).await?),
        Report::Summary => print_json(&aggregator.summaries(window).await?),
        Report::Uptime => print_json(&aggregator.uptime_by_latency_all(window, threshold).await?),
        Report::Speedtests => print_json(&aggregator.recent_speed_tests(window).await?),
        Report::Size => print_json(&aggregator.storage_footprint().await?),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Resolves on Ctrl+C, or SIGTERM on unix
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
        .context("failed to install SIGTERM handler")?;

    #[cfg(unix)]
    let terminate = terminate.recv();

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Option<()>>();

    tokio::select! {
        result = signal::ctrl_c() => result.context("failed to listen for Ctrl+C")?,
        _ = terminate => {},
    }

    info!("Received shutdown signal, cleaning up...");
    Ok(())
}
