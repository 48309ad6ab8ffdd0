//! Simulated order execution
//!
//! Every order fills. Execution latency is injected by sleeping a uniform
//! 10-100 microseconds, and fills slip by a uniform fraction within one
//! basis point of the requested price. Both the RNG and the latency sleep
//! are injectable so tests run deterministic.

use dc_core::time::{now_epoch_micros, now_epoch_nanos, precise_sleep, LatencyTimer};
use dc_core::{ExecutionRecord, ExecutionStatus, Order};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

/// Injected latency bounds, nanoseconds.
const MIN_LATENCY_NS: u64 = 10_000;
const MAX_LATENCY_NS: u64 = 100_000;
/// Slippage bound as a fraction of price (one basis point).
const SLIPPAGE_BOUND: f64 = 0.0001;

/// Simulated executor with injectable randomness.
#[derive(Debug)]
pub struct SimulatedExecutor {
    rng: StdRng,
    inject_latency: bool,
    order_seq: u64,
}

impl SimulatedExecutor {
    /// Production configuration: entropy-seeded RNG, latency injection on.
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
            inject_latency: true,
            order_seq: 0,
        }
    }

    /// Seeded RNG, latency injection on.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            inject_latency: true,
            order_seq: 0,
        }
    }

    /// Seeded RNG with latency sleeps disabled; fills are reproducible and
    /// fast, which is what tests want.
    pub fn deterministic(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            inject_latency: false,
            order_seq: 0,
        }
    }

    /// Fill one order.
    pub fn execute(&mut self, order: &Order) -> ExecutionRecord {
        let timer = LatencyTimer::start();

        if self.inject_latency {
            let latency_ns = self.rng.gen_range(MIN_LATENCY_NS..=MAX_LATENCY_NS);
            precise_sleep(Duration::from_nanos(latency_ns));
        }

        let slippage = self.rng.gen_range(-SLIPPAGE_BOUND..=SLIPPAGE_BOUND);
        self.order_seq += 1;

        ExecutionRecord {
            timestamp_ns: now_epoch_nanos(),
            order_id: format!("ORDER_{}_{}", self.order_seq, now_epoch_micros()),
            side: order.side,
            filled_price: order.price * (1.0 + slippage),
            filled_quantity: order.quantity,
            status: ExecutionStatus::Filled,
            symbol: order.symbol,
            execution_latency_ns: timer.elapsed_ns(),
        }
    }
}

impl Default for SimulatedExecutor {
    fn default() -> Self {
        Self::new()
    }
}
