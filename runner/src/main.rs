//! Trading pipeline runner
//!
//! Hosts the three-stage pipeline and supervises it until SIGINT/SIGTERM.
//! Exits 0 on a clean stop and 1 on any initialization failure, before any
//! worker has started.

use dc_runner::{Pipeline, SystemConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_CONFIG_PATH: &str = "config/system_config.json";
const STATS_INTERVAL_SECS: u64 = 10;

fn print_help() {
    eprintln!(
        r#"DC trading pipeline runner

USAGE:
    dc-runner [CONFIG_PATH]

ARGS:
    CONFIG_PATH    Configuration file (default: {DEFAULT_CONFIG_PATH})

ENVIRONMENT VARIABLES:
    RUST_LOG       Log level filter
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }
    let config_path = args.get(1).cloned().unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    tracing::info!(config = %config_path, "loading configuration");
    let config = match SystemConfig::load(&config_path) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "failed to load configuration");
            std::process::exit(1);
        }
    };

    let mut pipeline = match Pipeline::from_config(&config) {
        Ok(pipeline) => pipeline,
        Err(err) => {
            tracing::error!(error = %err, "failed to build pipeline");
            std::process::exit(1);
        }
    };

    if let Err(err) = pipeline.initialize() {
        tracing::error!(error = %err, "pipeline initialization failed");
        std::process::exit(1);
    }

    pipeline.start();
    tracing::info!("pipeline running, press Ctrl+C to stop");

    run_until_shutdown(&pipeline).await?;

    let clean = pipeline.stop();
    pipeline.final_report();
    if !clean {
        tracing::error!("a stage worker crashed during the run");
        std::process::exit(1);
    }
    tracing::info!("shutdown complete");
    Ok(())
}

async fn run_until_shutdown(pipeline: &Pipeline) -> anyhow::Result<()> {
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let mut stats = tokio::time::interval(std::time::Duration::from_secs(STATS_INTERVAL_SECS));
    // The first tick fires immediately; skip it
    stats.tick().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received SIGINT, shutting down");
                return Ok(());
            }
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM, shutting down");
                return Ok(());
            }
            _ = stats.tick() => {
                pipeline.log_statistics();
            }
        }
    }
}
