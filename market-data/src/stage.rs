//! Market-data stage worker
//!
//! Owns the inbound tick subscription, the DC detector and the outbound
//! signal publication. The worker is an OS thread running a tight
//! poll/process/offer loop with a 1 ms sleeping idle strategy.

use crate::detector::DcDetector;
use crate::error::MarketDataError;
use dc_core::time::LatencyTimer;
use dc_core::{LatencyStats, Tick};
use dc_transport::{
    await_publication_connected, await_subscription_connected, offer_with_retry, BoxPublication,
    BoxSubscription, DcSignalMessage, RetryPolicy, Subscription, TickMessage, TransportError,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

const POLL_FRAGMENT_LIMIT: usize = 10;
const IDLE: Duration = Duration::from_millis(1);

/// Market-data stage configuration.
#[derive(Debug, Clone)]
pub struct MarketDataConfig {
    /// DC threshold
    pub theta: f64,
    /// Publish the total-move extent on signals (zeroed when disabled)
    pub enable_tmv_calculation: bool,
    /// Publish the time-adjusted return on signals (zeroed when disabled)
    pub enable_time_adjustment: bool,
    /// How long `initialize` waits for each endpoint
    pub connect_timeout: Duration,
    /// Bounded retry applied to back-pressured offers
    pub retry: RetryPolicy,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            theta: 0.004,
            enable_tmv_calculation: true,
            enable_time_adjustment: true,
            connect_timeout: Duration::from_secs(5),
            retry: RetryPolicy::default(),
        }
    }
}

/// Snapshot of the stage counters.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct MarketDataStatistics {
    pub messages_processed: u64,
    pub dc_events_detected: u64,
    pub invalid_frames: u64,
    pub rejected_ticks: u64,
    pub dropped_signals: u64,
    pub avg_processing_latency_ns: i64,
    pub max_processing_latency_ns: i64,
}

#[derive(Default)]
struct StageCounters {
    messages_processed: u64,
    dc_events_detected: u64,
    invalid_frames: u64,
    rejected_ticks: u64,
    dropped_signals: u64,
    latency: LatencyStats,
}

/// Endpoints and detector handed to the worker thread; returned on stop so
/// the stage can restart without losing state.
struct WorkerState {
    subscription: BoxSubscription,
    publication: BoxPublication,
    detector: DcDetector,
}

/// The market-data stage.
pub struct MarketDataStage {
    config: MarketDataConfig,
    state: Option<WorkerState>,
    worker: Option<JoinHandle<WorkerState>>,
    running: Arc<AtomicBool>,
    stats: Arc<Mutex<StageCounters>>,
    /// f64 bits of the active threshold, relayed to the worker's detector
    theta_bits: Arc<AtomicU64>,
}

impl MarketDataStage {
    /// Create the stage around its two endpoints.
    ///
    /// Fails with `InvalidInput` when the configured theta is rejected by
    /// the detector.
    pub fn new(
        subscription: BoxSubscription,
        publication: BoxPublication,
        config: MarketDataConfig,
    ) -> Result<Self, MarketDataError> {
        let detector = DcDetector::new(config.theta)?;
        Ok(Self {
            theta_bits: Arc::new(AtomicU64::new(config.theta.to_bits())),
            state: Some(WorkerState {
                subscription,
                publication,
                detector,
            }),
            worker: None,
            running: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(Mutex::new(StageCounters::default())),
            config,
        })
    }

    /// Block until both endpoints are connected.
    ///
    /// A timeout surfaces as `TransportInit`; the caller treats that as
    /// fatal to the stage.
    pub fn initialize(&self) -> Result<(), MarketDataError> {
        let state = self
            .state
            .as_ref()
            .ok_or(MarketDataError::TransportInit(TransportError::NotConnected))?;
        tracing::info!(target: "MarketData", "connecting stage endpoints");
        await_subscription_connected(state.subscription.as_ref(), self.config.connect_timeout)
            .map_err(MarketDataError::TransportInit)?;
        await_publication_connected(state.publication.as_ref(), self.config.connect_timeout)
            .map_err(MarketDataError::TransportInit)?;
        tracing::info!(target: "MarketData", "stage endpoints connected");
        Ok(())
    }

    /// Spawn the worker. Idempotent: calling while running is a no-op.
    pub fn start(&mut self) {
        if self.running.load(Ordering::Acquire) {
            tracing::warn!(target: "MarketData", "stage already running");
            return;
        }
        let Some(state) = self.state.take() else {
            tracing::warn!(target: "MarketData", "stage endpoints unavailable, not starting");
            return;
        };

        self.running.store(true, Ordering::Release);
        let worker = Worker {
            state,
            running: Arc::clone(&self.running),
            stats: Arc::clone(&self.stats),
            theta_bits: Arc::clone(&self.theta_bits),
            enable_tmv: self.config.enable_tmv_calculation,
            enable_time_adjustment: self.config.enable_time_adjustment,
            retry: self.config.retry,
        };
        self.worker = Some(
            std::thread::Builder::new()
                .name("market-data".into())
                .spawn(move || worker.run())
                .expect("failed to spawn market-data worker"),
        );
        tracing::info!(target: "MarketData", "stage started");
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
                    tracing::error!(target: "MarketData", "worker panicked");
                    clean = false;
                }
            }
        }
        tracing::info!(target: "MarketData", "stage stopped");
        clean
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Replace the DC threshold; effective immediately, including mid-run.
    pub fn set_threshold(&mut self, theta: f64) -> Result<(), MarketDataError> {
        if !theta.is_finite() || theta <= 0.0 {
            return Err(MarketDataError::InvalidInput(format!(
                "theta must be finite and positive, got {}",
                theta
            )));
        }
        self.theta_bits.store(theta.to_bits(), Ordering::Release);
        if let Some(state) = self.state.as_mut() {
            state.detector.set_theta(theta)?;
        }
        tracing::info!(target: "MarketData", theta, "DC threshold updated");
        Ok(())
    }

    /// Read-only snapshot of the stage counters.
    pub fn statistics(&self) -> MarketDataStatistics {
        let stats = self.stats.lock();
        MarketDataStatistics {
            messages_processed: stats.messages_processed,
            dc_events_detected: stats.dc_events_detected,
            invalid_frames: stats.invalid_frames,
            rejected_ticks: stats.rejected_ticks,
            dropped_signals: stats.dropped_signals,
            avg_processing_latency_ns: stats.latency.avg_ns(),
            max_processing_latency_ns: stats.latency.max_ns(),
        }
    }
}

impl Drop for MarketDataStage {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker {
    state: WorkerState,
    running: Arc<AtomicBool>,
    stats: Arc<Mutex<StageCounters>>,
    theta_bits: Arc<AtomicU64>,
    enable_tmv: bool,
    enable_time_adjustment: bool,
    retry: RetryPolicy,
}

impl Worker {
    fn run(self) -> WorkerState {
        let Worker {
            state,
            running,
            stats,
            theta_bits,
            enable_tmv,
            enable_time_adjustment,
            retry,
        } = self;
        let WorkerState {
            subscription,
            publication,
            mut detector,
        } = state;

        tracing::info!(target: "MarketData", "processing loop started");
        let mut connection_lost_logged = false;

        while running.load(Ordering::Acquire) {
            // Relay a threshold change into the exclusively-owned detector
            let theta = f64::from_bits(theta_bits.load(Ordering::Acquire));
            if theta != detector.theta() {
                let _ = detector.set_theta(theta);
            }

            let polled = subscription.poll(
                &mut |frame| {
                    process_frame(
                        frame,
                        &mut detector,
                        publication.as_ref(),
                        &stats,
                        enable_tmv,
                        enable_time_adjustment,
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
                        tracing::error!(target: "MarketData", "inbound connection lost");
                        connection_lost_logged = true;
                    }
                    std::thread::sleep(IDLE);
                }
                Err(err) => {
                    tracing::error!(target: "MarketData", error = %err, "poll failed");
                    std::thread::sleep(IDLE);
                }
            }
        }

        tracing::info!(target: "MarketData", "processing loop ended");
        WorkerState {
            subscription,
            publication,
            detector,
        }
    }
}

fn process_frame(
    frame: &[u8],
    detector: &mut DcDetector,
    publication: &dyn dc_transport::Publication,
    stats: &Mutex<StageCounters>,
    enable_tmv: bool,
    enable_time_adjustment: bool,
    retry: RetryPolicy,
) {
    let timer = LatencyTimer::start();

    let message = match TickMessage::decode(frame) {
        Ok(message) => message,
        Err(err) => {
            tracing::warn!(target: "MarketData", error = %err, "dropping malformed tick frame");
            stats.lock().invalid_frames += 1;
            return;
        }
    };

    let tick = Tick::new(
        message.timestamp_ns,
        message.price,
        message.volume,
        message.symbol(),
    );
    let event = match detector.process_tick(&tick) {
        Ok(event) => event,
        Err(err) => {
            tracing::warn!(target: "MarketData", error = %err, "rejecting tick");
            stats.lock().rejected_ticks += 1;
            return;
        }
    };

    // Processing latency covers decode + detection, not downstream offers
    {
        let mut counters = stats.lock();
        counters.messages_processed += 1;
        if event.is_some() {
            counters.dc_events_detected += 1;
        }
        counters.latency.record(timer.elapsed_ns());
    }

    let Some(event) = event else {
        return;
    };

    let mut signal = DcSignalMessage::from_event(&event, tick.symbol);
    if !enable_tmv {
        signal.tmv_ext = 0.0;
    }
    if !enable_time_adjustment {
        signal.time_adjusted_return = 0.0;
    }

    tracing::debug!(
        target: "MarketData",
        kind = ?event.kind,
        price = event.price,
        tmv_ext = event.tmv_ext,
        "DC event detected"
    );

    // A confirmed DC is a confirmed DC: detector state is never rolled back,
    // even when downstream misses the signal.
    match offer_with_retry(publication, &signal.encode(), retry) {
        Ok(_) => {}
        Err(err) => {
            tracing::warn!(target: "MarketData", error = %err, "dropping DC signal");
            stats.lock().dropped_signals += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dc_core::Symbol;
    use dc_transport::{channel_pair, Publication, Subscription};

    fn tick_frame(ts: i64, price: f64) -> Vec<u8> {
        TickMessage::new(ts, price, 1_000.0, Symbol::new("EURUSD"))
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

    fn stage_config(theta: f64) -> MarketDataConfig {
        MarketDataConfig {
            theta,
            retry: RetryPolicy {
                max_retries: 3,
                backoff: Duration::from_micros(10),
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_rejects_invalid_theta_at_construction() {
        let (_tick_pub, tick_sub) = channel_pair(16);
        let (signal_pub, _signal_sub) = channel_pair(16);
        let result = MarketDataStage::new(
            Box::new(tick_sub),
            Box::new(signal_pub),
            stage_config(0.0),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_detects_and_publishes_downturn() {
        let (tick_pub, tick_sub) = channel_pair(64);
        let (signal_pub, signal_sub) = channel_pair(64);

        let mut stage = MarketDataStage::new(
            Box::new(tick_sub),
            Box::new(signal_pub),
            stage_config(0.01),
        )
        .unwrap();
        stage.initialize().unwrap();
        stage.start();

        for (i, price) in [100.0, 101.0, 102.0, 103.0, 101.5].iter().enumerate() {
            tick_pub
                .offer(&tick_frame((i as i64 + 1) * 1_000_000_000, *price))
                .unwrap();
        }

        wait_for(|| stage.statistics().dc_events_detected == 1);
        stage.stop();

        let stats = stage.statistics();
        assert_eq!(stats.messages_processed, 5);
        assert_eq!(stats.dc_events_detected, 1);
        assert_eq!(stats.dropped_signals, 0);
        assert!(stats.max_processing_latency_ns >= stats.avg_processing_latency_ns);

        let mut frames = Vec::new();
        signal_sub
            .poll(&mut |data| frames.push(data.to_vec()), 16)
            .unwrap();
        assert_eq!(frames.len(), 1);

        let signal = DcSignalMessage::decode(&frames[0]).unwrap();
        assert_eq!(signal.event_type, 2);
        assert_eq!(signal.price, 101.5);
        assert!((signal.tmv_ext - 1.5 / 1.03).abs() < 1e-9);
        assert_eq!(signal.symbol().as_str(), "EURUSD");
    }

    #[test]
    fn test_malformed_frame_counted_not_fatal() {
        let (tick_pub, tick_sub) = channel_pair(64);
        let (signal_pub, _signal_sub) = channel_pair(64);

        let mut stage = MarketDataStage::new(
            Box::new(tick_sub),
            Box::new(signal_pub),
            stage_config(0.01),
        )
        .unwrap();
        stage.start();

        tick_pub.offer(&[0u8; 7]).unwrap();
        tick_pub.offer(&tick_frame(1, 100.0)).unwrap();

        wait_for(|| stage.statistics().messages_processed == 1);
        stage.stop();

        let stats = stage.statistics();
        assert_eq!(stats.invalid_frames, 1);
        assert_eq!(stats.messages_processed, 1);
    }

    #[test]
    fn test_start_twice_is_noop_and_stop_idempotent() {
        let (_tick_pub, tick_sub) = channel_pair(16);
        let (signal_pub, _signal_sub) = channel_pair(16);

        let mut stage = MarketDataStage::new(
            Box::new(tick_sub),
            Box::new(signal_pub),
            stage_config(0.01),
        )
        .unwrap();

        stage.start();
        assert!(stage.is_running());
        stage.start();
        assert!(stage.is_running());

        stage.stop();
        assert!(!stage.is_running());
        stage.stop();
    }

    #[test]
    fn test_restart_preserves_statistics() {
        let (tick_pub, tick_sub) = channel_pair(64);
        let (signal_pub, _signal_sub) = channel_pair(64);

        let mut stage = MarketDataStage::new(
            Box::new(tick_sub),
            Box::new(signal_pub),
            stage_config(0.01),
        )
        .unwrap();
        stage.start();

        for i in 0..3 {
            tick_pub.offer(&tick_frame(i, 100.0)).unwrap();
        }
        wait_for(|| stage.statistics().messages_processed == 3);

        stage.stop();
        let before = stage.statistics();
        stage.start();
        let after = stage.statistics();
        stage.stop();

        assert_eq!(before.messages_processed, after.messages_processed);
        assert_eq!(before.dc_events_detected, after.dc_events_detected);
        assert_eq!(
            before.avg_processing_latency_ns,
            after.avg_processing_latency_ns
        );
    }

    #[test]
    fn test_backpressure_drops_signal_but_keeps_detector_consistent() {
        let (tick_pub, tick_sub) = channel_pair(64);
        // Outbound capacity 1 with no consumer draining: the second signal
        // cannot be delivered
        let (signal_pub, signal_sub) = channel_pair(1);

        let mut stage = MarketDataStage::new(
            Box::new(tick_sub),
            Box::new(signal_pub),
            stage_config(0.01),
        )
        .unwrap();
        stage.start();

        // Two full reversals: down to 98, back up above threshold, and a
        // third reversal to prove the detector still alternates
        let prices = [100.0, 98.0, 100.5, 98.2];
        for (i, price) in prices.iter().enumerate() {
            tick_pub
                .offer(&tick_frame((i as i64 + 1) * 1_000_000_000, *price))
                .unwrap();
        }

        wait_for(|| stage.statistics().messages_processed == prices.len() as u64);
        wait_for(|| stage.statistics().dropped_signals >= 1);
        stage.stop();

        let stats = stage.statistics();
        assert_eq!(stats.dc_events_detected, 3);
        assert!(stats.dropped_signals >= 1);
        // messages_processed kept advancing despite the drops
        assert_eq!(stats.messages_processed, 4);

        // The one delivered signal is the first downturn
        let mut frames = Vec::new();
        signal_sub
            .poll(&mut |data| frames.push(data.to_vec()), 16)
            .unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(DcSignalMessage::decode(&frames[0]).unwrap().event_type, 2);
    }

    #[test]
    fn test_set_threshold_while_running() {
        let (tick_pub, tick_sub) = channel_pair(64);
        let (signal_pub, signal_sub) = channel_pair(64);

        let mut stage = MarketDataStage::new(
            Box::new(tick_sub),
            Box::new(signal_pub),
            stage_config(0.10),
        )
        .unwrap();
        stage.start();

        // 2% drop: invisible at theta 0.10
        tick_pub.offer(&tick_frame(1, 100.0)).unwrap();
        tick_pub.offer(&tick_frame(2, 98.0)).unwrap();
        wait_for(|| stage.statistics().messages_processed == 2);
        assert_eq!(stage.statistics().dc_events_detected, 0);

        // Tighten to 1% and drop again
        stage.set_threshold(0.01).unwrap();
        // Let the worker pass the top of its loop and observe the update
        std::thread::sleep(Duration::from_millis(5));
        tick_pub.offer(&tick_frame(3, 96.5)).unwrap();
        wait_for(|| stage.statistics().dc_events_detected == 1);
        stage.stop();

        let mut frames = 0;
        signal_sub.poll(&mut |_| frames += 1, 16).unwrap();
        assert_eq!(frames, 1);
    }

    #[test]
    fn test_set_threshold_rejects_invalid() {
        let (_tick_pub, tick_sub) = channel_pair(16);
        let (signal_pub, _signal_sub) = channel_pair(16);
        let mut stage = MarketDataStage::new(
            Box::new(tick_sub),
            Box::new(signal_pub),
            stage_config(0.01),
        )
        .unwrap();
        assert!(stage.set_threshold(-0.5).is_err());
        assert!(stage.set_threshold(f64::NAN).is_err());
    }
}
