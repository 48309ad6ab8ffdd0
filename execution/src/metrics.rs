//! Performance tracking
//!
//! Capital, position, drawdown, win rate and Sharpe bookkeeping derived
//! solely from the filled execution series.

use dc_core::{ExecutionRecord, ExecutionStatus, LatencyStats, Side};
use serde::Serialize;
use std::collections::VecDeque;

/// Trailing window of per-trade returns kept for the Sharpe estimate.
const RETURNS_WINDOW: usize = 252;

/// Snapshot of the execution performance metrics.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PerformanceMetrics {
    pub total_pnl: f64,
    pub win_rate: f64,
    pub total_trades: u64,
    pub winning_trades: u64,
    pub losing_trades: u64,
    pub max_drawdown: f64,
    pub sharpe_ratio: f64,
    pub avg_trade_pnl: f64,
    pub avg_execution_latency_ns: i64,
    pub max_execution_latency_ns: i64,
}

/// Stateful performance bookkeeper owned by the execution stage.
#[derive(Debug, Clone)]
pub struct PerformanceTracker {
    initial_capital: f64,
    current_capital: f64,
    peak_capital: f64,
    current_position: f64,
    returns: VecDeque<f64>,
    latency: LatencyStats,
    metrics: PerformanceMetrics,
}

impl PerformanceTracker {
    pub fn new(initial_capital: f64) -> Self {
        Self {
            initial_capital,
            current_capital: initial_capital,
            peak_capital: initial_capital,
            current_position: 0.0,
            returns: VecDeque::with_capacity(RETURNS_WINDOW),
            latency: LatencyStats::new(),
            metrics: PerformanceMetrics::default(),
        }
    }

    /// Fold one filled execution and its trade P&L into the metrics.
    ///
    /// Only `Filled` records mutate state; anything else is ignored here
    /// (pending and rejected records still sit in the trade history).
    pub fn apply_fill(&mut self, record: &ExecutionRecord, trade_pnl: f64) {
        if record.status != ExecutionStatus::Filled {
            return;
        }

        match record.side {
            Side::Buy => self.current_position += record.filled_quantity,
            Side::Sell => self.current_position -= record.filled_quantity,
            Side::Hold => {}
        }

        self.current_capital += trade_pnl;

        self.metrics.total_pnl += trade_pnl;
        self.metrics.total_trades += 1;
        if trade_pnl > 0.0 {
            self.metrics.winning_trades += 1;
        } else if trade_pnl < 0.0 {
            self.metrics.losing_trades += 1;
        }
        self.metrics.win_rate = self.metrics.winning_trades as f64 / self.metrics.total_trades as f64;
        self.metrics.avg_trade_pnl = self.metrics.total_pnl / self.metrics.total_trades as f64;

        self.update_drawdown();

        if record.execution_latency_ns > 0 {
            self.latency.record(record.execution_latency_ns);
            self.metrics.avg_execution_latency_ns = self.latency.avg_ns();
            self.metrics.max_execution_latency_ns = self.latency.max_ns();
        }

        if self.returns.len() == RETURNS_WINDOW {
            self.returns.pop_front();
        }
        self.returns.push_back(trade_pnl / self.initial_capital);
        self.metrics.sharpe_ratio = self.sharpe_ratio();
    }

    fn update_drawdown(&mut self) {
        if self.current_capital > self.peak_capital {
            self.peak_capital = self.current_capital;
        }
        let drawdown = (self.peak_capital - self.current_capital) / self.peak_capital;
        if drawdown > self.metrics.max_drawdown {
            self.metrics.max_drawdown = drawdown;
        }
    }

    /// Sharpe over the trailing return window, unbiased stddev, zero
    /// risk-free rate. The sqrt(252) annualization factors cancel.
    fn sharpe_ratio(&self) -> f64 {
        let n = self.returns.len();
        if n < 2 {
            return 0.0;
        }

        let mean = self.returns.iter().sum::<f64>() / n as f64;
        let variance = self
            .returns
            .iter()
            .map(|r| (r - mean) * (r - mean))
            .sum::<f64>()
            / (n - 1) as f64;
        let std_dev = variance.sqrt();

        if std_dev > 0.0 {
            mean / std_dev
        } else {
            0.0
        }
    }

    pub fn metrics(&self) -> PerformanceMetrics {
        self.metrics
    }

    #[inline]
    pub fn initial_capital(&self) -> f64 {
        self.initial_capital
    }

    #[inline]
    pub fn current_capital(&self) -> f64 {
        self.current_capital
    }

    #[inline]
    pub fn peak_capital(&self) -> f64 {
        self.peak_capital
    }

    #[inline]
    pub fn current_position(&self) -> f64 {
        self.current_position
    }

    /// Restore the tracker to its initial state.
    pub fn reset(&mut self) {
        *self = Self::new(self.initial_capital);
    }
}
