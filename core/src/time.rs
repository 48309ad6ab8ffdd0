//! Time utilities: wall clock, monotonic latency measurement, precise sleep

use crate::stats::LatencyStats;
use parking_lot::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Wall-clock time source.
///
/// Production code uses [`SystemClock`]; tests inject a fixed or scripted
/// implementation so timestamps are deterministic.
pub trait Clock: Send + Sync {
    /// Nanoseconds since the Unix epoch.
    fn now_ns(&self) -> i64;
}

/// Real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now_ns(&self) -> i64 {
        now_epoch_nanos()
    }
}

/// Current wall-clock time in nanoseconds since the Unix epoch.
pub fn now_epoch_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos().min(i64::MAX as u128) as i64)
        .unwrap_or(0)
}

/// Current wall-clock time in microseconds since the Unix epoch.
pub fn now_epoch_micros() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros().min(i64::MAX as u128) as i64)
        .unwrap_or(0)
}

/// Difference `end - start` in nanoseconds, saturating at the i64 bounds.
#[inline]
pub fn saturating_duration_ns(start_ns: i64, end_ns: i64) -> i64 {
    end_ns.saturating_sub(start_ns)
}

/// Monotonic stopwatch for latency spans.
#[derive(Debug, Clone, Copy)]
pub struct LatencyTimer {
    start: Instant,
}

impl LatencyTimer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Elapsed nanoseconds since start, saturating at i64::MAX.
    pub fn elapsed_ns(&self) -> i64 {
        self.start.elapsed().as_nanos().min(i64::MAX as u128) as i64
    }
}

/// Records the elapsed span into a shared [`LatencyStats`] when dropped.
pub struct ScopedLatency<'a> {
    timer: LatencyTimer,
    sink: &'a Mutex<LatencyStats>,
}

impl<'a> ScopedLatency<'a> {
    pub fn new(sink: &'a Mutex<LatencyStats>) -> Self {
        Self {
            timer: LatencyTimer::start(),
            sink,
        }
    }

    pub fn elapsed_ns(&self) -> i64 {
        self.timer.elapsed_ns()
    }
}

impl Drop for ScopedLatency<'_> {
    fn drop(&mut self) {
        self.sink.lock().record(self.timer.elapsed_ns());
    }
}

/// Remaining duration below which `precise_sleep` spins instead of sleeping.
const SPIN_THRESHOLD: Duration = Duration::from_micros(50);

/// Sleep for `duration` with sub-millisecond accuracy.
///
/// The bulk is handed to the platform sleep; only the tail below
/// [`SPIN_THRESHOLD`] is spun, yielding on every iteration.
pub fn precise_sleep(duration: Duration) {
    let start = Instant::now();
    if duration > SPIN_THRESHOLD {
        std::thread::sleep(duration - SPIN_THRESHOLD);
    }
    while start.elapsed() < duration {
        std::hint::spin_loop();
        std::thread::yield_now();
    }
}

/// Render an epoch-nanosecond timestamp as UTC with microsecond precision.
pub fn format_timestamp(timestamp_ns: i64) -> String {
    let secs = timestamp_ns.div_euclid(1_000_000_000);
    let nanos = timestamp_ns.rem_euclid(1_000_000_000) as u32;
    match chrono::DateTime::from_timestamp(secs, nanos) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
        None => format!("{}ns", timestamp_ns),
    }
}
