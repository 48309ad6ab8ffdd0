//! Strategy stage worker
//!
//! Consumes DC signals, applies the decision rule and regime gate, and
//! publishes sized orders downstream. Same lifecycle contract as the
//! market-data stage: idempotent start/stop, an OS-thread worker with a
//! 1 ms sleeping idle, and statistics that survive a restart.

use crate::decision::decide;
use crate::error::StrategyError;
use crate::regime::{MarketState, RegimeClassifier};
use crate::sizing::order_quantity;
use dc_core::time::{saturating_duration_ns, LatencyTimer};
use dc_core::{Clock, LatencyStats, Order, Side, SystemClock};
use dc_transport::{
    await_publication_connected, await_subscription_connected, offer_with_retry, BoxPublication,
    BoxSubscription, DcSignalMessage, OrderMessage, RetryPolicy, Subscription, TransportError,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

const POLL_FRAGMENT_LIMIT: usize = 10;
const IDLE: Duration = Duration::from_millis(1);

/// Strategy stage configuration.
#[derive(Debug, Clone)]
pub struct StrategyConfig {
    /// Gate sizing on the volatility regime classifier
    pub enable_hmm: bool,
    /// Static leverage factor applied to every order
    pub leverage_factor: f64,
    /// How long `initialize` waits for each endpoint
    pub connect_timeout: Duration,
    /// Bounded retry applied to back-pressured offers
    pub retry: RetryPolicy,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            enable_hmm: false,
            leverage_factor: 1.0,
            connect_timeout: Duration::from_secs(5),
            retry: RetryPolicy::default(),
        }
    }
}

/// Snapshot of the stage counters.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StrategyStatistics {
    pub signals_processed: u64,
    pub orders_generated: u64,
    pub buy_signals: u64,
    pub sell_signals: u64,
    pub invalid_frames: u64,
    pub dropped_orders: u64,
    pub avg_strategy_latency_ns: i64,
    pub max_strategy_latency_ns: i64,
    pub current_market_state: MarketState,
}

#[derive(Default)]
struct StageCounters {
    signals_processed: u64,
    orders_generated: u64,
    buy_signals: u64,
    sell_signals: u64,
    invalid_frames: u64,
    dropped_orders: u64,
    latency: LatencyStats,
    current_market_state: MarketState,
}

struct WorkerState {
    subscription: BoxSubscription,
    publication: BoxPublication,
    classifier: RegimeClassifier,
}

/// The strategy stage.
pub struct StrategyStage {
    config: StrategyConfig,
    state: Option<WorkerState>,
    worker: Option<JoinHandle<WorkerState>>,
    running: Arc<AtomicBool>,
    stats: Arc<Mutex<StageCounters>>,
    clock: Arc<dyn Clock>,
    /// f64 bits of the active leverage factor, relayed to the worker
    leverage_bits: Arc<AtomicU64>,
    hmm_enabled: Arc<AtomicBool>,
}

impl StrategyStage {
    pub fn new(
        subscription: BoxSubscription,
        publication: BoxPublication,
        config: StrategyConfig,
    ) -> Self {
        Self::with_clock(subscription, publication, config, Arc::new(SystemClock))
    }

    /// Construct with an injected wall clock (deterministic tests).
    pub fn with_clock(
        subscription: BoxSubscription,
        publication: BoxPublication,
        config: StrategyConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            leverage_bits: Arc::new(AtomicU64::new(config.leverage_factor.to_bits())),
            hmm_enabled: Arc::new(AtomicBool::new(config.enable_hmm)),
            config,
            state: Some(WorkerState {
                subscription,
                publication,
                classifier: RegimeClassifier::new(),
            }),
            worker: None,
            running: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(Mutex::new(StageCounters::default())),
            clock,
        }
    }

    /// Replace the leverage factor; effective immediately, including mid-run.
    pub fn set_leverage_factor(&self, leverage_factor: f64) -> Result<(), StrategyError> {
        if !leverage_factor.is_finite() || leverage_factor <= 0.0 {
            return Err(StrategyError::InvalidInput(format!(
                "leverage factor must be finite and positive, got {}",
                leverage_factor
            )));
        }
        self.leverage_bits
            .store(leverage_factor.to_bits(), Ordering::Release);
        tracing::info!(target: "Strategy", leverage_factor, "leverage factor updated");
        Ok(())
    }

    /// Toggle the regime gate; effective immediately, including mid-run.
    pub fn set_hmm_enabled(&self, enabled: bool) {
        self.hmm_enabled.store(enabled, Ordering::Release);
        tracing::info!(target: "Strategy", enabled, "regime gating toggled");
    }

    /// Block until both endpoints are connected; timeout is fatal.
    pub fn initialize(&self) -> Result<(), StrategyError> {
        let state = self
            .state
            .as_ref()
            .ok_or(StrategyError::TransportInit(TransportError::NotConnected))?;
        tracing::info!(target: "Strategy", "connecting stage endpoints");
        await_subscription_connected(state.subscription.as_ref(), self.config.connect_timeout)
            .map_err(StrategyError::TransportInit)?;
        await_publication_connected(state.publication.as_ref(), self.config.connect_timeout)
            .map_err(StrategyError::TransportInit)?;
        tracing::info!(target: "Strategy", "stage endpoints connected");
        Ok(())
    }

    /// Spawn the worker. Idempotent: calling while running is a no-op.
    pub fn start(&mut self) {
        if self.running.load(Ordering::Acquire) {
            tracing::warn!(target: "Strategy", "stage already running");
            return;
        }
        let Some(state) = self.state.take() else {
            tracing::warn!(target: "Strategy", "stage endpoints unavailable, not starting");
            return;
        };

        self.running.store(true, Ordering::Release);
        let worker = Worker {
            state,
            running: Arc::clone(&self.running),
            stats: Arc::clone(&self.stats),
            clock: Arc::clone(&self.clock),
            hmm_enabled: Arc::clone(&self.hmm_enabled),
            leverage_bits: Arc::clone(&self.leverage_bits),
            retry: self.config.retry,
        };
        self.worker = Some(
            std::thread::Builder::new()
                .name("strategy".into())
                .spawn(move || worker.run())
                .expect("failed to spawn strategy worker"),
        );
        tracing::info!(target: "Strategy", "stage started");
    }

    /// Stop the worker and join it. Idempotent.
    ///
    /// Returns false if the worker had crashed; the orchestrator treats
    /// that as fatal.
    pub fn stop(&mut self) -> bool {
        if !self.running.swap(false, Ordering::AcqRel) {
            return true;
        }
        let mut clean = true;
        if let Some(handle) = self.worker.take() {
            match handle.join() {
                Ok(state) => self.state = Some(state),
                Err(_) => {
                    tracing::error!(target: "Strategy", "worker panicked");
                    clean = false;
                }
            }
        }
        tracing::info!(target: "Strategy", "stage stopped");
        clean
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Read-only snapshot of the stage counters.
    pub fn statistics(&self) -> StrategyStatistics {
        let stats = self.stats.lock();
        StrategyStatistics {
            signals_processed: stats.signals_processed,
            orders_generated: stats.orders_generated,
            buy_signals: stats.buy_signals,
            sell_signals: stats.sell_signals,
            invalid_frames: stats.invalid_frames,
            dropped_orders: stats.dropped_orders,
            avg_strategy_latency_ns: stats.latency.avg_ns(),
            max_strategy_latency_ns: stats.latency.max_ns(),
            current_market_state: stats.current_market_state,
        }
    }
}

impl Drop for StrategyStage {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker {
    state: WorkerState,
    running: Arc<AtomicBool>,
    stats: Arc<Mutex<StageCounters>>,
    clock: Arc<dyn Clock>,
    hmm_enabled: Arc<AtomicBool>,
    leverage_bits: Arc<AtomicU64>,
    retry: RetryPolicy,
}

impl Worker {
    fn run(self) -> WorkerState {
        let Worker {
            state,
            running,
            stats,
            clock,
            hmm_enabled,
            leverage_bits,
            retry,
        } = self;
        let WorkerState {
            subscription,
            publication,
            mut classifier,
        } = state;

        tracing::info!(target: "Strategy", "processing loop started");
        let mut connection_lost_logged = false;

        while running.load(Ordering::Acquire) {
            let enable_hmm = hmm_enabled.load(Ordering::Acquire);
            let leverage_factor = f64::from_bits(leverage_bits.load(Ordering::Acquire));
            let polled = subscription.poll(
                &mut |frame| {
                    process_signal(
                        frame,
                        &mut classifier,
                        publication.as_ref(),
                        &stats,
                        clock.as_ref(),
                        enable_hmm,
                        leverage_factor,
                        retry,
                    );
                },
                POLL_FRAGMENT_LIMIT,
            );

            match polled {
                Ok(0) => std::thread::sleep(IDLE),
                Ok(_) => {}
                Err(TransportError::Closed) => {
                    if !connection_lost_logged {
                        tracing::error!(target: "Strategy", "inbound connection lost");
                        connection_lost_logged = true;
                    }
                    std::thread::sleep(IDLE);
                }
                Err(err) => {
                    tracing::error!(target: "Strategy", error = %err, "poll failed");
                    std::thread::sleep(IDLE);
                }
            }
        }

        tracing::info!(target: "Strategy", "processing loop ended");
        WorkerState {
            subscription,
            publication,
            classifier,
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn process_signal(
    frame: &[u8],
    classifier: &mut RegimeClassifier,
    publication: &dyn dc_transport::Publication,
    stats: &Mutex<StageCounters>,
    clock: &dyn Clock,
    enable_hmm: bool,
    leverage_factor: f64,
    retry: RetryPolicy,
) {
    let timer = LatencyTimer::start();

    let signal = match DcSignalMessage::decode(frame) {
        Ok(signal) => signal,
        Err(err) => {
            tracing::warn!(target: "Strategy", error = %err, "dropping malformed signal frame");
            stats.lock().invalid_frames += 1;
            return;
        }
    };

    stats.lock().signals_processed += 1;

    let regime_factor = if enable_hmm {
        let state = classifier.observe(&signal);
        stats.lock().current_market_state = state;
        state.leverage()
    } else {
        1.0
    };

    if let Some(side) = decide(&signal) {
        let now_ns = clock.now_ns();
        let order = Order {
            timestamp_ns: now_ns,
            side,
            price: signal.price,
            quantity: order_quantity(signal.price, leverage_factor, regime_factor),
            symbol: signal.symbol(),
            // Cross-stage span; clock drift can make it negative, clamp at 0
            strategy_latency_ns: saturating_duration_ns(signal.timestamp_ns, now_ns).max(0),
        };

        let frame = OrderMessage::from_order(&order).encode();
        match offer_with_retry(publication, &frame, retry) {
            Ok(_) => {
                let mut counters = stats.lock();
                counters.orders_generated += 1;
                match side {
                    Side::Buy => counters.buy_signals += 1,
                    Side::Sell => counters.sell_signals += 1,
                    Side::Hold => {}
                }
                tracing::debug!(
                    target: "Strategy",
                    side = ?side,
                    price = order.price,
                    quantity = order.quantity,
                    "order generated"
                );
            }
            Err(err) => {
                tracing::warn!(target: "Strategy", error = %err, "dropping order");
                stats.lock().dropped_orders += 1;
            }
        }
    }

    stats.lock().latency.record(timer.elapsed_ns());
}

#[cfg(test)]
mod tests {
    use super::*;
    use dc_core::{DcEvent, DcEventKind, Symbol};
    use dc_transport::{channel_pair, Publication, Subscription};

    struct FixedClock(i64);
    impl Clock for FixedClock {
        fn now_ns(&self) -> i64 {
            self.0
        }
    }

    fn signal_frame(event: DcEvent) -> Vec<u8> {
        DcSignalMessage::from_event(&event, Symbol::new("EURUSD"))
            .encode()
            .to_vec()
    }

    fn upturn(time_adjusted_return: f64) -> DcEvent {
        DcEvent {
            kind: DcEventKind::Upturn,
            timestamp_ns: 1_000,
            price: 98.5,
            tmv_ext: 1.55,
            duration_ns: 3_000_000_000,
            time_adjusted_return,
        }
    }

    fn downturn(time_adjusted_return: f64) -> DcEvent {
        DcEvent {
            kind: DcEventKind::Downturn,
            timestamp_ns: 1_000,
            price: 101.5,
            tmv_ext: 1.46,
            duration_ns: 3_000_000_000,
            time_adjusted_return,
        }
    }

    fn wait_for<F: Fn() -> bool>(predicate: F) {
        for _ in 0..500 {
            if predicate() {
                return;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        panic!("condition not reached within timeout");
    }

    fn run_stage_with(
        config: StrategyConfig,
        frames: Vec<Vec<u8>>,
        expect_orders: u64,
    ) -> (StrategyStatistics, Vec<OrderMessage>) {
        let (signal_pub, signal_sub) = channel_pair(64);
        let (order_pub, order_sub) = channel_pair(64);

        let mut stage = StrategyStage::with_clock(
            Box::new(signal_sub),
            Box::new(order_pub),
            config,
            Arc::new(FixedClock(5_000)),
        );
        stage.initialize().unwrap();
        stage.start();

        let expected = frames.len() as u64;
        for frame in frames {
            signal_pub.offer(&frame).unwrap();
        }
        wait_for(|| {
            let stats = stage.statistics();
            stats.signals_processed + stats.invalid_frames == expected
        });
        wait_for(|| stage.statistics().orders_generated == expect_orders);
        stage.stop();

        let mut orders = Vec::new();
        order_sub
            .poll(
                &mut |data| orders.push(OrderMessage::decode(data).unwrap()),
                64,
            )
            .unwrap();
        (stage.statistics(), orders)
    }

    #[test]
    fn test_upturn_generates_buy_order() {
        let (stats, orders) = run_stage_with(
            StrategyConfig::default(),
            vec![signal_frame(upturn(0.005))],
            1,
        );

        assert_eq!(stats.signals_processed, 1);
        assert_eq!(stats.orders_generated, 1);
        assert_eq!(stats.buy_signals, 1);
        assert_eq!(stats.sell_signals, 0);

        assert_eq!(orders.len(), 1);
        let order = &orders[0];
        assert_eq!(order.order_side(), Some(Side::Buy));
        assert_eq!(order.price, 98.5);
        // min(100, 10000/98.5) = 100 is above the cap
        assert!((order.quantity - 10_000.0 / 98.5).abs() < 1e-9);
        // FixedClock(5000) - signal ts 1000
        assert_eq!(order.strategy_latency_ns, 4_000);
        assert_eq!(order.symbol().as_str(), "EURUSD");
    }

    #[test]
    fn test_downturn_generates_sell_order() {
        let (stats, orders) = run_stage_with(
            StrategyConfig::default(),
            vec![signal_frame(downturn(-0.005))],
            1,
        );
        assert_eq!(stats.sell_signals, 1);
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].order_side(), Some(Side::Sell));
    }

    #[test]
    fn test_zero_return_generates_no_order() {
        let (stats, orders) = run_stage_with(
            StrategyConfig::default(),
            vec![signal_frame(upturn(0.0)), signal_frame(downturn(0.0))],
            0,
        );
        assert_eq!(stats.signals_processed, 2);
        assert_eq!(stats.orders_generated, 0);
        assert!(orders.is_empty());
    }

    #[test]
    fn test_negative_cross_stage_latency_clamped_to_zero() {
        // Signal timestamp after the stage clock: drifted upstream clock
        let mut event = upturn(0.005);
        event.timestamp_ns = 9_000;
        let (_stats, orders) = run_stage_with(
            StrategyConfig::default(),
            vec![signal_frame(event)],
            1,
        );
        assert_eq!(orders[0].strategy_latency_ns, 0);
    }

    #[test]
    fn test_regime_gate_scales_quantity() {
        // Low volatility: 0.05 tmv over 10s = 0.005/s < 0.1 -> leverage 1.5
        let mut event = upturn(0.005);
        event.tmv_ext = 0.05;
        event.duration_ns = 10_000_000_000;
        event.price = 10.0;

        let config = StrategyConfig {
            enable_hmm: true,
            ..Default::default()
        };
        let (stats, orders) = run_stage_with(config, vec![signal_frame(event)], 1);

        assert_eq!(stats.current_market_state, MarketState::LowVolatility);
        // 100 * 1.0 * 1.5 = 150, notional cap 10000/10 = 1000 not binding
        assert_eq!(orders[0].quantity, 150.0);
    }

    #[test]
    fn test_hmm_disabled_keeps_unknown_state() {
        let (stats, _orders) = run_stage_with(
            StrategyConfig::default(),
            vec![signal_frame(upturn(0.005))],
            1,
        );
        assert_eq!(stats.current_market_state, MarketState::Unknown);
    }

    #[test]
    fn test_malformed_frame_counted_not_fatal() {
        let (stats, orders) = run_stage_with(
            StrategyConfig::default(),
            vec![vec![1, 2, 3], signal_frame(upturn(0.005))],
            1,
        );
        assert_eq!(stats.invalid_frames, 1);
        assert_eq!(stats.signals_processed, 1);
        assert_eq!(orders.len(), 1);
    }

    #[test]
    fn test_set_leverage_factor_while_running() {
        let (signal_pub, signal_sub) = channel_pair(64);
        let (order_pub, order_sub) = channel_pair(64);

        let mut stage = StrategyStage::with_clock(
            Box::new(signal_sub),
            Box::new(order_pub),
            StrategyConfig::default(),
            Arc::new(FixedClock(5_000)),
        );
        stage.start();

        // Cheap price so the notional cap never binds
        let mut event = upturn(0.005);
        event.price = 10.0;

        signal_pub.offer(&signal_frame(event)).unwrap();
        wait_for(|| stage.statistics().orders_generated == 1);

        stage.set_leverage_factor(2.0).unwrap();
        // Let the worker pass the top of its loop and observe the update
        std::thread::sleep(Duration::from_millis(5));
        signal_pub.offer(&signal_frame(event)).unwrap();
        wait_for(|| stage.statistics().orders_generated == 2);
        stage.stop();

        let mut quantities = Vec::new();
        order_sub
            .poll(
                &mut |data| quantities.push(OrderMessage::decode(data).unwrap().quantity),
                16,
            )
            .unwrap();
        assert_eq!(quantities, vec![100.0, 200.0]);
    }

    #[test]
    fn test_set_leverage_factor_rejects_invalid() {
        let (_signal_pub, signal_sub) = channel_pair(8);
        let (order_pub, _order_sub) = channel_pair(8);
        let stage = StrategyStage::new(
            Box::new(signal_sub),
            Box::new(order_pub),
            StrategyConfig::default(),
        );
        assert!(stage.set_leverage_factor(0.0).is_err());
        assert!(stage.set_leverage_factor(f64::NAN).is_err());
        assert!(stage.set_leverage_factor(1.5).is_ok());
    }

    #[test]
    fn test_toggle_hmm_while_running() {
        let (signal_pub, signal_sub) = channel_pair(64);
        let (order_pub, order_sub) = channel_pair(64);

        let mut stage = StrategyStage::with_clock(
            Box::new(signal_sub),
            Box::new(order_pub),
            StrategyConfig::default(),
            Arc::new(FixedClock(5_000)),
        );
        stage.start();

        // Low-volatility signal: 1.5x only once the gate is on
        let mut event = upturn(0.005);
        event.price = 10.0;
        event.tmv_ext = 0.05;
        event.duration_ns = 10_000_000_000;

        signal_pub.offer(&signal_frame(event)).unwrap();
        wait_for(|| stage.statistics().orders_generated == 1);

        stage.set_hmm_enabled(true);
        std::thread::sleep(Duration::from_millis(5));
        signal_pub.offer(&signal_frame(event)).unwrap();
        wait_for(|| stage.statistics().orders_generated == 2);
        stage.stop();

        let mut quantities = Vec::new();
        order_sub
            .poll(
                &mut |data| quantities.push(OrderMessage::decode(data).unwrap().quantity),
                16,
            )
            .unwrap();
        assert_eq!(quantities, vec![100.0, 150.0]);
    }

    #[test]
    fn test_restart_preserves_statistics() {
        let (signal_pub, signal_sub) = channel_pair(64);
        let (order_pub, _order_sub) = channel_pair(64);

        let mut stage = StrategyStage::new(
            Box::new(signal_sub),
            Box::new(order_pub),
            StrategyConfig::default(),
        );
        stage.start();

        signal_pub.offer(&signal_frame(upturn(0.005))).unwrap();
        wait_for(|| stage.statistics().orders_generated == 1);

        stage.stop();
        let before = stage.statistics();
        stage.start();
        let after = stage.statistics();
        stage.stop();

        assert_eq!(before.signals_processed, after.signals_processed);
        assert_eq!(before.orders_generated, after.orders_generated);
        assert_eq!(before.buy_signals, after.buy_signals);
    }
}
