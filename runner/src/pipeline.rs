//! Pipeline wiring and supervision
//!
//! Builds the three channel pairs, constructs the stages around them, and
//! drives their shared lifecycle. Statistics flow one way: the supervisor
//! pulls read-only snapshots; stages never see each other.

use crate::config::SystemConfig;
use dc_execution::{ExecutionConfig, ExecutionError, ExecutionStage, PerformanceMetrics};
use dc_market_data::{MarketDataConfig, MarketDataError, MarketDataStage, MarketDataStatistics};
use dc_strategy::{StrategyConfig, StrategyError, StrategyStage, StrategyStatistics};
use dc_transport::{channel_pair, ChannelPublication};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("market-data stage: {0}")]
    MarketData(#[from] MarketDataError),

    #[error("strategy stage: {0}")]
    Strategy(#[from] StrategyError),

    #[error("execution stage: {0}")]
    Execution(#[from] ExecutionError),
}

/// Knobs the binaries and tests set on top of the config file.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineOptions {
    /// Seed the execution RNG (deterministic slippage)
    pub execution_seed: Option<u64>,
    /// Disable the simulated 10-100 us execution latency sleep
    pub disable_execution_latency: bool,
}

/// Aggregated read-only view of the three stages.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PipelineSnapshot {
    pub market_data: MarketDataStatistics,
    pub strategy: StrategyStatistics,
    pub execution: PerformanceMetrics,
}

/// One symbol, three stages, two internal hops.
pub struct Pipeline {
    market_data: MarketDataStage,
    strategy: StrategyStage,
    execution: ExecutionStage,
    tick_publication: ChannelPublication,
    config: SystemConfig,
}

impl Pipeline {
    /// Build from configuration with production options.
    pub fn from_config(config: &SystemConfig) -> Result<Self, PipelineError> {
        Self::with_options(config, PipelineOptions::default())
    }

    /// Build from configuration with explicit simulation options.
    pub fn with_options(
        config: &SystemConfig,
        options: PipelineOptions,
    ) -> Result<Self, PipelineError> {
        let capacity = config.transport.channel_capacity;
        let (tick_publication, tick_subscription) = channel_pair(capacity);
        let (signal_publication, signal_subscription) = channel_pair(capacity);
        let (order_publication, order_subscription) = channel_pair(capacity);

        let market_data = MarketDataStage::new(
            Box::new(tick_subscription),
            Box::new(signal_publication),
            MarketDataConfig {
                theta: config.dc_strategy.theta,
                enable_tmv_calculation: config.dc_strategy.enable_tmv_calculation,
                enable_time_adjustment: config.dc_strategy.enable_time_adjustment,
                connect_timeout: config.transport.market_data.timeout(),
                ..Default::default()
            },
        )?;

        let strategy = StrategyStage::new(
            Box::new(signal_subscription),
            Box::new(order_publication),
            StrategyConfig {
                enable_hmm: config.strategy_settings.enable_hmm,
                leverage_factor: config.strategy_settings.leverage_factor,
                connect_timeout: config.transport.strategy.timeout(),
                ..Default::default()
            },
        );

        let execution = ExecutionStage::new_simulated(
            Box::new(order_subscription),
            ExecutionConfig {
                connect_timeout: config.transport.execution.timeout(),
                seed: options.execution_seed,
                inject_latency: !options.disable_execution_latency,
                ..Default::default()
            },
        );

        Ok(Self {
            market_data,
            strategy,
            execution,
            tick_publication,
            config: config.clone(),
        })
    }

    /// Connect every stage's endpoints. Fatal on timeout; no worker has
    /// started yet when this fails.
    pub fn initialize(&self) -> Result<(), PipelineError> {
        self.market_data.initialize()?;
        self.strategy.initialize()?;
        self.execution.initialize()?;
        Ok(())
    }

    /// Start all stage workers, upstream first; the bounded channels
    /// buffer anything in between.
    pub fn start(&mut self) {
        self.market_data.start();
        self.strategy.start();
        self.execution.start();
        tracing::info!(target: "Performance", "pipeline started");
    }

    /// Stop all stage workers, upstream first so downstream drains.
    ///
    /// Returns false if any worker had crashed; the process should exit
    /// non-zero in that case.
    pub fn stop(&mut self) -> bool {
        let mut clean = self.market_data.stop();
        clean &= self.strategy.stop();
        clean &= self.execution.stop();
        tracing::info!(target: "Performance", "pipeline stopped");
        clean
    }

    /// The endpoint a tick source publishes into.
    pub fn tick_publication(&self) -> ChannelPublication {
        self.tick_publication.clone()
    }

    /// Pull one consistent-enough snapshot of all stage statistics.
    pub fn snapshot(&self) -> PipelineSnapshot {
        PipelineSnapshot {
            market_data: self.market_data.statistics(),
            strategy: self.strategy.statistics(),
            execution: self.execution.performance_metrics(),
        }
    }

    pub fn market_data(&self) -> &MarketDataStage {
        &self.market_data
    }

    pub fn strategy(&self) -> &StrategyStage {
        &self.strategy
    }

    pub fn execution(&self) -> &ExecutionStage {
        &self.execution
    }

    /// Log the periodic statistics report.
    pub fn log_statistics(&self) {
        let snapshot = self.snapshot();
        tracing::info!(
            target: "Performance",
            messages = snapshot.market_data.messages_processed,
            dc_events = snapshot.market_data.dc_events_detected,
            signals = snapshot.strategy.signals_processed,
            orders = snapshot.strategy.orders_generated,
            trades = snapshot.execution.total_trades,
            pnl = snapshot.execution.total_pnl,
            win_rate = snapshot.execution.win_rate,
            "pipeline statistics"
        );
        if self.config.performance.enable_latency_tracking {
            tracing::info!(
                target: "Performance",
                md_avg_ns = snapshot.market_data.avg_processing_latency_ns,
                md_max_ns = snapshot.market_data.max_processing_latency_ns,
                strategy_avg_ns = snapshot.strategy.avg_strategy_latency_ns,
                strategy_max_ns = snapshot.strategy.max_strategy_latency_ns,
                exec_avg_ns = snapshot.execution.avg_execution_latency_ns,
                exec_max_ns = snapshot.execution.max_execution_latency_ns,
                "stage latencies"
            );
        }
    }

    /// Log the end-of-run report and, when enabled, write the metrics JSON
    /// to the configured output file.
    pub fn final_report(&self) {
        let metrics = self.execution.performance_metrics();
        tracing::info!(
            target: "Performance",
            generated_at = %dc_core::time::format_timestamp(dc_core::time::now_epoch_nanos()),
            total_trades = metrics.total_trades,
            total_pnl = metrics.total_pnl,
            win_rate = metrics.win_rate,
            sharpe = metrics.sharpe_ratio,
            max_drawdown = metrics.max_drawdown,
            avg_execution_latency_ns = metrics.avg_execution_latency_ns,
            "final performance report"
        );

        if self.config.performance.enable_performance_metrics {
            let path = &self.config.performance.output_file;
            match serde_json::to_string_pretty(&self.snapshot()) {
                Ok(json) => {
                    if let Err(err) = std::fs::write(path, json) {
                        tracing::warn!(
                            target: "Performance",
                            error = %err,
                            path = %path,
                            "failed to write performance report"
                        );
                    }
                }
                Err(err) => {
                    tracing::warn!(target: "Performance", error = %err, "failed to serialize report");
                }
            }
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.stop();
    }
}
