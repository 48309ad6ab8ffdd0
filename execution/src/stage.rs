//! Execution stage worker
//!
//! Inbound-only: consumes orders, executes them, appends to the trade
//! history and updates the performance metrics. History append and metric
//! update happen under one critical section per order, so observers never
//! see a record without its metrics (or the reverse).

use crate::adapter::{ExecutionAdapter, FillDetails, OrderHandle};
use crate::error::ExecutionError;
use crate::metrics::{PerformanceMetrics, PerformanceTracker};
use crate::pnl::{LastPricePnl, PnlModel};
use crate::simulator::SimulatedExecutor;
use dc_core::time::{now_epoch_micros, now_epoch_nanos, saturating_duration_ns};
use dc_core::{ExecutionRecord, ExecutionStatus, Order};
use dc_transport::{
    await_subscription_connected, BoxSubscription, OrderMessage, Subscription, TransportError,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

const POLL_FRAGMENT_LIMIT: usize = 10;
const IDLE: Duration = Duration::from_millis(1);

/// Execution stage configuration.
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    pub initial_capital: f64,
    /// How long `initialize` waits for the inbound endpoint
    pub connect_timeout: Duration,
    /// RNG seed for simulated fills (None: entropy)
    pub seed: Option<u64>,
    /// Inject the simulated 10-100 us execution latency
    pub inject_latency: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            initial_capital: 100_000.0,
            connect_timeout: Duration::from_secs(5),
            seed: None,
            inject_latency: true,
        }
    }
}

/// Simulated or live order routing.
enum ExecutionMode {
    Simulated(SimulatedExecutor),
    Live {
        adapter: Box<dyn ExecutionAdapter>,
        order_seq: u64,
    },
}

/// Trade history plus bookkeeping, guarded by one mutex.
struct ExecutionBook {
    history: Vec<ExecutionRecord>,
    tracker: PerformanceTracker,
    pnl: Box<dyn PnlModel>,
    /// Live orders awaiting their fill callback: handle -> history index
    pending: HashMap<u64, usize>,
}

impl ExecutionBook {
    /// The single critical section per filled order.
    fn apply(&mut self, record: ExecutionRecord) {
        let trade_pnl = if record.status == ExecutionStatus::Filled {
            self.pnl
                .trade_pnl(record.side, record.filled_price, record.filled_quantity)
        } else {
            0.0
        };
        self.tracker.apply_fill(&record, trade_pnl);
        self.history.push(record);
    }
}

struct WorkerState {
    subscription: BoxSubscription,
    mode: ExecutionMode,
}

/// The execution stage.
pub struct ExecutionStage {
    config: ExecutionConfig,
    state: Option<WorkerState>,
    worker: Option<JoinHandle<WorkerState>>,
    running: Arc<AtomicBool>,
    book: Arc<Mutex<ExecutionBook>>,
    invalid_frames: Arc<AtomicU64>,
}

impl ExecutionStage {
    /// Simulated execution (the default mode).
    pub fn new_simulated(subscription: BoxSubscription, config: ExecutionConfig) -> Self {
        let executor = match (config.seed, config.inject_latency) {
            (Some(seed), true) => SimulatedExecutor::with_seed(seed),
            (Some(seed), false) => SimulatedExecutor::deterministic(seed),
            (None, _) => SimulatedExecutor::new(),
        };
        Self::with_mode(subscription, ExecutionMode::Simulated(executor), config)
    }

    /// Live execution through an adapter. Orders produce `Pending` records
    /// completed later via [`ExecutionStage::on_fill`].
    pub fn new_live(
        subscription: BoxSubscription,
        adapter: Box<dyn ExecutionAdapter>,
        config: ExecutionConfig,
    ) -> Self {
        Self::with_mode(
            subscription,
            ExecutionMode::Live {
                adapter,
                order_seq: 0,
            },
            config,
        )
    }

    fn with_mode(
        subscription: BoxSubscription,
        mode: ExecutionMode,
        config: ExecutionConfig,
    ) -> Self {
        Self {
            book: Arc::new(Mutex::new(ExecutionBook {
                history: Vec::new(),
                tracker: PerformanceTracker::new(config.initial_capital),
                pnl: Box::new(LastPricePnl::new()),
                pending: HashMap::new(),
            })),
            state: Some(WorkerState { subscription, mode }),
            worker: None,
            running: Arc::new(AtomicBool::new(false)),
            invalid_frames: Arc::new(AtomicU64::new(0)),
            config,
        }
    }

    /// Swap the P&L model. Call before the first order is processed.
    pub fn with_pnl_model(self, model: Box<dyn PnlModel>) -> Self {
        self.book.lock().pnl = model;
        self
    }

    /// Block until the inbound endpoint is connected; timeout is fatal.
    pub fn initialize(&self) -> Result<(), ExecutionError> {
        let state = self
            .state
            .as_ref()
            .ok_or(ExecutionError::TransportInit(TransportError::NotConnected))?;
        tracing::info!(target: "Execution", "connecting stage endpoint");
        await_subscription_connected(state.subscription.as_ref(), self.config.connect_timeout)
            .map_err(ExecutionError::TransportInit)?;
        tracing::info!(target: "Execution", "stage endpoint connected");
        Ok(())
    }

    /// Spawn the worker. Idempotent: calling while running is a no-op.
    pub fn start(&mut self) {
        if self.running.load(Ordering::Acquire) {
            tracing::warn!(target: "Execution", "stage already running");
            return;
        }
        let Some(state) = self.state.take() else {
            tracing::warn!(target: "Execution", "stage endpoint unavailable, not starting");
            return;
        };

        let mode = match &state.mode {
            ExecutionMode::Simulated(_) => "simulation",
            ExecutionMode::Live { .. } => "live",
        };

        self.running.store(true, Ordering::Release);
        let worker = Worker {
            state,
            running: Arc::clone(&self.running),
            book: Arc::clone(&self.book),
            invalid_frames: Arc::clone(&self.invalid_frames),
        };
        self.worker = Some(
            std::thread::Builder::new()
                .name("execution".into())
                .spawn(move || worker.run())
                .expect("failed to spawn execution worker"),
        );
        tracing::info!(target: "Execution", mode, "stage started");
    }

    /// Stop the worker and join it. In-flight executions complete; there is
    /// no mid-order cancellation. Idempotent.
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
                    tracing::error!(target: "Execution", "worker panicked");
                    clean = false;
                }
            }
        }
        tracing::info!(target: "Execution", "stage stopped");
        clean
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Complete a pending live order with its fill.
    pub fn on_fill(&self, handle: OrderHandle, fill: FillDetails) -> Result<(), ExecutionError> {
        let mut book = self.book.lock();
        let index = book.pending.remove(&handle.0).ok_or_else(|| {
            ExecutionError::InvalidInput(format!("unknown order handle {}", handle.0))
        })?;

        let record = {
            let record = &mut book.history[index];
            record.status = ExecutionStatus::Filled;
            record.filled_price = fill.price;
            record.filled_quantity = fill.quantity;
            record.execution_latency_ns =
                saturating_duration_ns(record.timestamp_ns, fill.timestamp_ns).max(0);
            record.clone()
        };

        let trade_pnl = book
            .pnl
            .trade_pnl(record.side, record.filled_price, record.filled_quantity);
        book.tracker.apply_fill(&record, trade_pnl);

        tracing::debug!(
            target: "Execution",
            order_id = %record.order_id,
            price = record.filled_price,
            "live fill applied"
        );
        Ok(())
    }

    /// Read-only snapshot of the performance metrics.
    pub fn performance_metrics(&self) -> PerformanceMetrics {
        self.book.lock().tracker.metrics()
    }

    /// Copy of the trade history.
    pub fn trade_history(&self) -> Vec<ExecutionRecord> {
        self.book.lock().history.clone()
    }

    pub fn current_capital(&self) -> f64 {
        self.book.lock().tracker.current_capital()
    }

    pub fn current_position(&self) -> f64 {
        self.book.lock().tracker.current_position()
    }

    /// Count of dropped inbound frames (wrong size or unknown side code).
    pub fn invalid_frames(&self) -> u64 {
        self.invalid_frames.load(Ordering::Relaxed)
    }

    /// Clear the history and restore the tracker to its initial capital.
    pub fn reset_performance(&self) {
        let mut book = self.book.lock();
        book.history.clear();
        book.pending.clear();
        book.tracker.reset();
        book.pnl.reset();
        tracing::info!(target: "Execution", "performance tracking reset");
    }
}

impl Drop for ExecutionStage {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker {
    state: WorkerState,
    running: Arc<AtomicBool>,
    book: Arc<Mutex<ExecutionBook>>,
    invalid_frames: Arc<AtomicU64>,
}

impl Worker {
    fn run(self) -> WorkerState {
        let Worker {
            state,
            running,
            book,
            invalid_frames,
        } = self;
        let WorkerState {
            subscription,
            mut mode,
        } = state;

        tracing::info!(target: "Execution", "processing loop started");
        let mut connection_lost_logged = false;

        while running.load(Ordering::Acquire) {
            let polled = subscription.poll(
                &mut |frame| {
                    process_order(frame, &mut mode, &book, &invalid_frames);
                },
                POLL_FRAGMENT_LIMIT,
            );

            match polled {
                Ok(0) => std::thread::sleep(IDLE),
                Ok(_) => {}
                Err(TransportError::Closed) => {
                    if !connection_lost_logged {
                        tracing::error!(target: "Execution", "inbound connection lost");
                        connection_lost_logged = true;
                    }
                    std::thread::sleep(IDLE);
                }
                Err(err) => {
                    tracing::error!(target: "Execution", error = %err, "poll failed");
                    std::thread::sleep(IDLE);
                }
            }
        }

        tracing::info!(target: "Execution", "processing loop ended");
        WorkerState { subscription, mode }
    }
}

fn process_order(
    frame: &[u8],
    mode: &mut ExecutionMode,
    book: &Mutex<ExecutionBook>,
    invalid_frames: &AtomicU64,
) {
    let order = match OrderMessage::decode(frame).map(|msg| msg.to_order()) {
        Ok(Some(order)) => order,
        Ok(None) => {
            tracing::warn!(target: "Execution", "dropping order with unknown side code");
            invalid_frames.fetch_add(1, Ordering::Relaxed);
            return;
        }
        Err(err) => {
            tracing::warn!(target: "Execution", error = %err, "dropping malformed order frame");
            invalid_frames.fetch_add(1, Ordering::Relaxed);
            return;
        }
    };

    match mode {
        ExecutionMode::Simulated(executor) => {
            let record = executor.execute(&order);
            tracing::debug!(
                target: "Execution",
                order_id = %record.order_id,
                side = ?record.side,
                price = record.filled_price,
                quantity = record.filled_quantity,
                "order executed"
            );
            book.lock().apply(record);
        }
        ExecutionMode::Live { adapter, order_seq } => {
            submit_live(&order, adapter.as_mut(), order_seq, book);
        }
    }
}

fn submit_live(
    order: &Order,
    adapter: &mut dyn ExecutionAdapter,
    order_seq: &mut u64,
    book: &Mutex<ExecutionBook>,
) {
    *order_seq += 1;
    let record = ExecutionRecord {
        timestamp_ns: now_epoch_nanos(),
        order_id: format!("ORDER_{}_{}", order_seq, now_epoch_micros()),
        side: order.side,
        filled_price: order.price,
        filled_quantity: order.quantity,
        status: ExecutionStatus::Pending,
        symbol: order.symbol,
        execution_latency_ns: 0,
    };

    match adapter.submit(order) {
        Ok(handle) => {
            let mut book = book.lock();
            let index = book.history.len();
            book.history.push(record);
            book.pending.insert(handle.0, index);
        }
        Err(err) => {
            tracing::warn!(target: "Execution", error = %err, "adapter rejected order");
            let mut rejected = record;
            rejected.status = ExecutionStatus::Rejected;
            book.lock().apply(rejected);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::AdapterError;
    use dc_core::{Side, Symbol};
    use dc_transport::{channel_pair, Publication};

    fn order_frame(side: Side, price: f64, quantity: f64) -> Vec<u8> {
        OrderMessage::from_order(&Order {
            timestamp_ns: now_epoch_nanos(),
            side,
            price,
            quantity,
            symbol: Symbol::new("EURUSD"),
            strategy_latency_ns: 100,
        })
        .encode()
        .to_vec()
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

    fn deterministic_config() -> ExecutionConfig {
        ExecutionConfig {
            seed: Some(42),
            inject_latency: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_simulated_orders_fill_and_update_metrics() {
        let (order_pub, order_sub) = channel_pair(64);
        let mut stage = ExecutionStage::new_simulated(Box::new(order_sub), deterministic_config());
        stage.initialize().unwrap();
        stage.start();

        order_pub.offer(&order_frame(Side::Sell, 101.5, 98.0)).unwrap();
        order_pub.offer(&order_frame(Side::Buy, 101.5, 98.0)).unwrap();

        wait_for(|| stage.performance_metrics().total_trades == 2);
        stage.stop();

        let history = stage.trade_history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].side, Side::Sell);
        assert_eq!(history[0].status, ExecutionStatus::Filled);
        assert_eq!(history[1].side, Side::Buy);

        // Sell then buy of equal size flattens the position
        assert_eq!(stage.current_position(), 0.0);

        // Slippage stays inside one basis point of the requested price
        for record in &history {
            assert!((record.filled_price - 101.5).abs() <= 101.5 * 0.0001 + 1e-9);
        }
    }

    #[test]
    fn test_first_sell_then_buy_realizes_nothing() {
        // The first fill seeds the last-price reference, so a sell/buy
        // round trip realizes zero P&L under the documented model
        let (order_pub, order_sub) = channel_pair(64);
        let mut stage = ExecutionStage::new_simulated(Box::new(order_sub), deterministic_config());
        stage.start();

        order_pub.offer(&order_frame(Side::Sell, 101.5, 98.0)).unwrap();
        order_pub.offer(&order_frame(Side::Buy, 101.5, 98.0)).unwrap();
        wait_for(|| stage.performance_metrics().total_trades == 2);
        stage.stop();

        assert_eq!(stage.performance_metrics().total_pnl, 0.0);
    }

    #[test]
    fn test_buy_then_sell_realizes_last_price_pnl() {
        let (order_pub, order_sub) = channel_pair(64);
        let mut stage = ExecutionStage::new_simulated(Box::new(order_sub), deterministic_config());
        stage.start();

        order_pub.offer(&order_frame(Side::Buy, 100.0, 10.0)).unwrap();
        order_pub.offer(&order_frame(Side::Sell, 102.0, 10.0)).unwrap();
        wait_for(|| stage.performance_metrics().total_trades == 2);
        stage.stop();

        let history = stage.trade_history();
        let expected = (history[1].filled_price - history[0].filled_price) * 10.0;
        let metrics = stage.performance_metrics();
        assert!((metrics.total_pnl - expected).abs() < 1e-9);
        // Roughly (102 - 100) * 10 up to slippage
        assert!((metrics.total_pnl - 20.0).abs() < 102.0 * 0.0001 * 10.0 * 2.0 + 1e-9);
        assert_eq!(metrics.winning_trades, 1);
    }

    #[test]
    fn test_malformed_frames_counted_not_fatal() {
        let (order_pub, order_sub) = channel_pair(64);
        let mut stage = ExecutionStage::new_simulated(Box::new(order_sub), deterministic_config());
        stage.start();

        order_pub.offer(&[1, 2, 3]).unwrap();
        order_pub.offer(&order_frame(Side::Buy, 100.0, 1.0)).unwrap();

        wait_for(|| stage.performance_metrics().total_trades == 1);
        stage.stop();

        assert_eq!(stage.invalid_frames(), 1);
        assert_eq!(stage.trade_history().len(), 1);
    }

    #[test]
    fn test_unknown_side_code_dropped() {
        let (order_pub, order_sub) = channel_pair(64);
        let mut stage = ExecutionStage::new_simulated(Box::new(order_sub), deterministic_config());
        stage.start();

        let mut msg = OrderMessage::decode(&order_frame(Side::Buy, 100.0, 1.0)).unwrap();
        msg.side = 9;
        order_pub.offer(&msg.encode()).unwrap();
        order_pub.offer(&order_frame(Side::Buy, 100.0, 1.0)).unwrap();

        wait_for(|| stage.performance_metrics().total_trades == 1);
        stage.stop();
        assert_eq!(stage.invalid_frames(), 1);
    }

    /// Flat commission per fill, stands in for a replacement P&L model.
    struct FlatCommissionPnl;

    impl crate::pnl::PnlModel for FlatCommissionPnl {
        fn trade_pnl(&mut self, _side: Side, _price: f64, _quantity: f64) -> f64 {
            -1.5
        }
        fn reset(&mut self) {}
    }

    #[test]
    fn test_pnl_model_is_replaceable() {
        let (order_pub, order_sub) = channel_pair(64);
        let mut stage = ExecutionStage::new_simulated(Box::new(order_sub), deterministic_config())
            .with_pnl_model(Box::new(FlatCommissionPnl));
        stage.start();

        order_pub.offer(&order_frame(Side::Buy, 100.0, 5.0)).unwrap();
        order_pub.offer(&order_frame(Side::Buy, 100.0, 5.0)).unwrap();
        wait_for(|| stage.performance_metrics().total_trades == 2);
        stage.stop();

        let metrics = stage.performance_metrics();
        assert_eq!(metrics.total_pnl, -3.0);
        assert_eq!(metrics.losing_trades, 2);
    }

    #[test]
    fn test_reset_performance() {
        let (order_pub, order_sub) = channel_pair(64);
        let mut stage = ExecutionStage::new_simulated(Box::new(order_sub), deterministic_config());
        stage.start();

        order_pub.offer(&order_frame(Side::Buy, 100.0, 5.0)).unwrap();
        wait_for(|| stage.performance_metrics().total_trades == 1);
        stage.stop();

        stage.reset_performance();
        assert_eq!(stage.performance_metrics().total_trades, 0);
        assert!(stage.trade_history().is_empty());
        assert_eq!(stage.current_capital(), 100_000.0);
    }

    struct ScriptedAdapter {
        next_handle: u64,
        fail: bool,
    }

    impl ExecutionAdapter for ScriptedAdapter {
        fn submit(&mut self, _order: &Order) -> Result<OrderHandle, AdapterError> {
            if self.fail {
                return Err(AdapterError::Submit("venue offline".to_string()));
            }
            self.next_handle += 1;
            Ok(OrderHandle(self.next_handle))
        }
    }

    #[test]
    fn test_live_order_pending_then_filled_via_callback() {
        let (order_pub, order_sub) = channel_pair(64);
        let adapter = ScriptedAdapter {
            next_handle: 0,
            fail: false,
        };
        let mut stage = ExecutionStage::new_live(
            Box::new(order_sub),
            Box::new(adapter),
            ExecutionConfig::default(),
        );
        stage.start();

        order_pub.offer(&order_frame(Side::Buy, 100.0, 10.0)).unwrap();
        wait_for(|| !stage.trade_history().is_empty());
        stage.stop();

        let history = stage.trade_history();
        assert_eq!(history[0].status, ExecutionStatus::Pending);
        // No metrics until the fill lands
        assert_eq!(stage.performance_metrics().total_trades, 0);

        stage
            .on_fill(
                OrderHandle(1),
                FillDetails {
                    price: 100.02,
                    quantity: 10.0,
                    timestamp_ns: now_epoch_nanos(),
                },
            )
            .unwrap();

        let history = stage.trade_history();
        assert_eq!(history[0].status, ExecutionStatus::Filled);
        assert_eq!(history[0].filled_price, 100.02);
        assert_eq!(stage.performance_metrics().total_trades, 1);
        assert_eq!(stage.current_position(), 10.0);
    }

    #[test]
    fn test_live_submit_failure_records_rejection() {
        let (order_pub, order_sub) = channel_pair(64);
        let adapter = ScriptedAdapter {
            next_handle: 0,
            fail: true,
        };
        let mut stage = ExecutionStage::new_live(
            Box::new(order_sub),
            Box::new(adapter),
            ExecutionConfig::default(),
        );
        stage.start();

        order_pub.offer(&order_frame(Side::Buy, 100.0, 10.0)).unwrap();
        wait_for(|| !stage.trade_history().is_empty());
        stage.stop();

        let history = stage.trade_history();
        assert_eq!(history[0].status, ExecutionStatus::Rejected);
        assert_eq!(stage.performance_metrics().total_trades, 0);
    }

    #[test]
    fn test_on_fill_unknown_handle_errors() {
        let (_order_pub, order_sub) = channel_pair(8);
        let stage = ExecutionStage::new_simulated(Box::new(order_sub), deterministic_config());
        let result = stage.on_fill(
            OrderHandle(99),
            FillDetails {
                price: 1.0,
                quantity: 1.0,
                timestamp_ns: 0,
            },
        );
        assert!(result.is_err());
    }
}
