//! Tick feed simulation
//!
//! A trending random walk with occasional reversal-sized jumps, published
//! as 40-byte tick frames at a paced message rate. Seedable for
//! reproducible runs.

use dc_core::time::now_epoch_nanos;
use dc_core::Symbol;
use dc_transport::{Publication, TickMessage, TransportError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Price band the walk is clamped to.
const PRICE_FLOOR: f64 = 100.0;
const PRICE_CEILING: f64 = 200.0;
/// Size of the occasional injected jump, as a fraction of price.
const JUMP_FRACTION: f64 = 0.005;

/// Tick feed configuration.
#[derive(Debug, Clone)]
pub struct TickFeedConfig {
    pub symbol: String,
    pub initial_price: f64,
    /// Per-tick noise scale
    pub volatility: f64,
    pub messages_per_second: u32,
    /// Seed for reproducible runs (None: entropy)
    pub seed: Option<u64>,
}

impl Default for TickFeedConfig {
    fn default() -> Self {
        Self {
            symbol: "EURUSD".to_string(),
            initial_price: 150.0,
            volatility: 0.02,
            messages_per_second: 1_000,
            seed: None,
        }
    }
}

/// Trending random-walk tick source.
pub struct TickFeed {
    symbol: Symbol,
    price: f64,
    trend: f64,
    volatility: f64,
    interval: Duration,
    rng: StdRng,
    noise: Normal<f64>,
    trend_noise: Normal<f64>,
    published: u64,
    dropped: u64,
}

impl TickFeed {
    pub fn new(config: TickFeedConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let rate = config.messages_per_second.max(1);
        Self {
            symbol: Symbol::new(&config.symbol),
            price: config.initial_price,
            trend: 0.0,
            volatility: config.volatility,
            interval: Duration::from_micros(1_000_000 / rate as u64),
            rng,
            noise: Normal::new(0.0, 1.0).expect("unit normal"),
            trend_noise: Normal::new(0.0, 0.001).expect("trend normal"),
            published: 0,
            dropped: 0,
        }
    }

    /// Advance the walk and produce the next tick.
    pub fn next_tick(&mut self) -> TickMessage {
        self.step_price();
        let volume = self.rng.gen_range(1_000.0..10_000.0);
        TickMessage::new(now_epoch_nanos(), self.price, volume, self.symbol)
    }

    fn step_price(&mut self) {
        // Trend persists with slow decay and a small innovation
        self.trend = self.trend * 0.99 + self.trend_noise.sample(&mut self.rng);

        let shock = self.noise.sample(&mut self.rng);
        self.price += self.trend + self.volatility * shock * self.price * 0.0001;

        // Rare jump, large enough to confirm a directional change
        if self.noise.sample(&mut self.rng) > 2.5 {
            let direction = if self.noise.sample(&mut self.rng) > 0.0 {
                1.0
            } else {
                -1.0
            };
            let jump = direction * self.price * JUMP_FRACTION;
            self.price += jump;
            tracing::debug!(target: "MarketData", jump, price = self.price, "injected jump");
        }

        self.price = self.price.clamp(PRICE_FLOOR, PRICE_CEILING);
    }

    /// Publish ticks at the configured rate until `running` clears.
    pub fn run(&mut self, publication: &dyn Publication, running: &AtomicBool) {
        tracing::info!(
            target: "MarketData",
            symbol = %self.symbol,
            interval_us = self.interval.as_micros() as u64,
            "tick feed started"
        );

        let mut next_send = Instant::now();
        while running.load(Ordering::Acquire) {
            let tick = self.next_tick();
            match publication.offer(&tick.encode()) {
                Ok(_) => self.published += 1,
                Err(TransportError::BackPressured) => {
                    // Consumer is behind; skip this tick rather than stall
                    self.dropped += 1;
                    std::thread::sleep(Duration::from_micros(1));
                }
                Err(err) => {
                    tracing::error!(target: "MarketData", error = %err, "tick publish failed");
                    break;
                }
            }

            if self.published % 10_000 == 0 && self.published > 0 {
                tracing::info!(
                    target: "MarketData",
                    published = self.published,
                    price = self.price,
                    "tick feed progress"
                );
            }

            next_send += self.interval;
            let now = Instant::now();
            if next_send > now {
                std::thread::sleep(next_send - now);
            } else {
                // Fell behind the schedule; re-anchor instead of bursting
                next_send = now;
            }
        }

        tracing::info!(
            target: "MarketData",
            published = self.published,
            dropped = self.dropped,
            "tick feed stopped"
        );
    }

    #[inline]
    pub fn published(&self) -> u64 {
        self.published
    }

    #[inline]
    pub fn current_price(&self) -> f64 {
        self.price
    }
}
