//! Latency statistics shared by the pipeline stages

use serde::{Deserialize, Serialize};

/// Exponentially weighted latency tracker.
///
/// The first sample seeds the average; every later sample folds in with
/// weight 0.1 against 0.9 for the running value. The same coefficients are
/// used by every stage of the pipeline.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LatencyStats {
    avg_ns: i64,
    max_ns: i64,
    samples: u64,
}

const EWMA_NEW: f64 = 0.1;
const EWMA_OLD: f64 = 0.9;

impl LatencyStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one latency sample (nanoseconds) into the running statistics.
    pub fn record(&mut self, sample_ns: i64) {
        self.samples += 1;
        if self.samples == 1 {
            self.avg_ns = sample_ns;
        } else {
            self.avg_ns = (EWMA_OLD * self.avg_ns as f64 + EWMA_NEW * sample_ns as f64) as i64;
        }
        if sample_ns > self.max_ns {
            self.max_ns = sample_ns;
        }
    }

    #[inline]
    pub fn avg_ns(&self) -> i64 {
        self.avg_ns
    }

    #[inline]
    pub fn max_ns(&self) -> i64 {
        self.max_ns
    }

    #[inline]
    pub fn samples(&self) -> u64 {
        self.samples
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sample_seeds_average() {
        let mut stats = LatencyStats::new();
        stats.record(1_000);
        assert_eq!(stats.avg_ns(), 1_000);
        assert_eq!(stats.max_ns(), 1_000);
        assert_eq!(stats.samples(), 1);
    }

    #[test]
    fn test_ewma_weighting() {
        let mut stats = LatencyStats::new();
        stats.record(1_000);
        stats.record(2_000);
        // 0.9 * 1000 + 0.1 * 2000 = 1100
        assert_eq!(stats.avg_ns(), 1_100);
        assert_eq!(stats.max_ns(), 2_000);
    }

    #[test]
    fn test_max_tracks_peak_not_last() {
        let mut stats = LatencyStats::new();
        stats.record(5_000);
        stats.record(100);
        stats.record(200);
        assert_eq!(stats.max_ns(), 5_000);
    }

    #[test]
    fn test_converges_to_constant_input() {
        let mut stats = LatencyStats::new();
        for _ in 0..200 {
            stats.record(42_000);
        }
        assert_eq!(stats.avg_ns(), 42_000);
    }

    #[test]
    fn test_reset() {
        let mut stats = LatencyStats::new();
        stats.record(1_000);
        stats.reset();
        assert_eq!(stats.samples(), 0);
        assert_eq!(stats.avg_ns(), 0);
        assert_eq!(stats.max_ns(), 0);
    }
}
