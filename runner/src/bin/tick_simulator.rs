//! Tick simulator
//!
//! Drives a complete in-process pipeline with the simulated tick feed. The
//! channel transport lives inside the process, so the demo attaches the
//! feed directly to the pipeline's tick endpoint.

use dc_runner::{Pipeline, SystemConfig, TickFeed, TickFeedConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_CONFIG_PATH: &str = "config/system_config.json";
const DEFAULT_RATE: u32 = 1_000;
const STATS_INTERVAL_SECS: u64 = 10;

fn print_help() {
    eprintln!(
        r#"Tick simulator - feeds a synthetic tick stream through the pipeline

USAGE:
    tick-simulator [CONFIG_PATH] [MESSAGES_PER_SECOND]

ARGS:
    CONFIG_PATH            Configuration file (default: {DEFAULT_CONFIG_PATH})
    MESSAGES_PER_SECOND    Tick rate (default: {DEFAULT_RATE})
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
    let rate: u32 = match args.get(2).map(|raw| raw.parse()) {
        Some(Ok(rate)) => rate,
        Some(Err(_)) => {
            eprintln!("invalid messages-per-second value: {}", args[2]);
            print_help();
            std::process::exit(1);
        }
        None => DEFAULT_RATE,
    };

    tracing::info!(config = %config_path, rate, "loading configuration");
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

    // Feed runs on its own thread; the pacing loop would starve an async
    // executor
    let running = Arc::new(AtomicBool::new(true));
    let feed_running = Arc::clone(&running);
    let tick_publication = pipeline.tick_publication();
    let feed = std::thread::Builder::new()
        .name("tick-feed".into())
        .spawn(move || {
            let mut feed = TickFeed::new(TickFeedConfig {
                messages_per_second: rate,
                ..Default::default()
            });
            feed.run(&tick_publication, &feed_running);
            feed.published()
        })?;

    tracing::info!("simulation running, press Ctrl+C to stop");
    run_until_shutdown(&pipeline).await?;

    running.store(false, Ordering::Release);
    match feed.join() {
        Ok(published) => tracing::info!(published, "tick feed finished"),
        Err(_) => tracing::error!("tick feed panicked"),
    }

    let clean = pipeline.stop();
    pipeline.final_report();
    if !clean {
        tracing::error!("a stage worker crashed during the run");
        std::process::exit(1);
    }
    tracing::info!("simulator shutdown complete");
    Ok(())
}

async fn run_until_shutdown(pipeline: &Pipeline) -> anyhow::Result<()> {
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let mut stats = tokio::time::interval(std::time::Duration::from_secs(STATS_INTERVAL_SECS));
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
